use crate::errors::ConfigurationError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "INSTANCEPEDIA";

fn default_aws_region() -> String {
    "us-east-1".to_string()
}
fn default_pricing_concurrency() -> usize {
    10
}
fn default_cli_pricing_concurrency() -> usize {
    5
}
fn default_pricing_retry_concurrency() -> usize {
    3
}
fn default_pricing_request_delay_ms() -> u64 {
    50
}
fn default_spot_batch_size() -> usize {
    50 // describe_spot_price_history instance type limit
}
fn default_max_retries() -> u32 {
    3
}
fn default_cache_ttl_seconds() -> u64 {
    4 * 60 * 60 // pricing rarely changes within a few hours
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

/// Application settings.
///
/// Precedence (highest first): `INSTANCEPEDIA_*` environment variables, the TOML file at
/// [`config_path`], built-in defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// Max concurrent pricing requests for interactive (TUI) batches
    #[serde(default = "default_pricing_concurrency")]
    pub pricing_concurrency: usize,
    /// Max concurrent pricing requests for CLI batches
    #[serde(default = "default_cli_pricing_concurrency")]
    pub cli_pricing_concurrency: usize,
    /// Concurrency used when re-fetching prices that failed in a previous batch
    #[serde(default = "default_pricing_retry_concurrency")]
    pub pricing_retry_concurrency: usize,
    /// Pacing delay applied before every batched request
    #[serde(default = "default_pricing_request_delay_ms")]
    pub pricing_request_delay_ms: u64,
    #[serde(default = "default_spot_batch_size")]
    pub spot_batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Optional steady-state ceiling on remote calls per second
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Treat unmapped region codes as their own pricing location
    #[serde(default = "default_false")]
    pub region_identity_fallback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aws_region: default_aws_region(),
            pricing_concurrency: default_pricing_concurrency(),
            cli_pricing_concurrency: default_cli_pricing_concurrency(),
            pricing_retry_concurrency: default_pricing_retry_concurrency(),
            pricing_request_delay_ms: default_pricing_request_delay_ms(),
            spot_batch_size: default_spot_batch_size(),
            max_retries: default_max_retries(),
            requests_per_second: None,
            use_cache: default_true(),
            cache_dir: None,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            region_identity_fallback: default_false(),
        }
    }
}

/// `~/.instancepedia`, or a relative `.instancepedia` when no home directory is known.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".instancepedia"))
        .unwrap_or_else(|| PathBuf::from(".instancepedia"))
}

pub fn config_path() -> PathBuf {
    app_dir().join("config.toml")
}

pub fn default_cache_dir() -> PathBuf {
    app_dir().join("cache")
}

impl Settings {
    /// Loads defaults, then `~/.instancepedia/config.toml` (if present), then the environment.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(config_path()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate().map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }

    /// Loads an explicit TOML file on top of the defaults. The environment is not consulted.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path).required(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate().map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pricing_concurrency == 0 {
            return Err(invalid("pricing_concurrency", "must be at least 1"));
        }
        if self.cli_pricing_concurrency == 0 {
            return Err(invalid("cli_pricing_concurrency", "must be at least 1"));
        }
        if self.pricing_retry_concurrency == 0 {
            return Err(invalid("pricing_retry_concurrency", "must be at least 1"));
        }
        if self.spot_batch_size == 0 {
            return Err(invalid("spot_batch_size", "must be at least 1"));
        }
        if self.requests_per_second == Some(0) {
            return Err(invalid("requests_per_second", "must be at least 1 when set"));
        }
        if self.cache_ttl_seconds == 0 {
            return Err(invalid("cache_ttl_seconds", "must be at least 1"));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.pricing_request_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

/// Commented template written by `pricing_cache init-config`.
pub fn default_config_template() -> &'static str {
    r#"# Instancepedia Configuration
# Place this file at ~/.instancepedia/config.toml
# Every value can be overridden with an INSTANCEPEDIA_<NAME> environment variable.

# AWS Configuration
# aws_region = "us-east-1"

# Performance Configuration
# pricing_concurrency = 10        # TUI mode concurrent requests
# cli_pricing_concurrency = 5     # CLI mode concurrent requests
# pricing_retry_concurrency = 3   # Concurrent requests when re-fetching failures
# pricing_request_delay_ms = 50   # Delay before each batched request
# spot_batch_size = 50            # Instance types per spot price API call
# max_retries = 3                 # Retries per price lookup
# requests_per_second = 20        # Optional ceiling on remote calls per second

# Cache Configuration
# use_cache = true
# cache_dir = "/home/me/.instancepedia/cache"
# cache_ttl_seconds = 14400       # 4 hours

# Region handling
# region_identity_fallback = false
"#
}
