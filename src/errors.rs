// src/errors.rs

use std::path::PathBuf;

/// Error codes the pricing and EC2 endpoints use to signal throttling.
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Failure reported by a [`PricingClient`](crate::pricing_client::PricingClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("throttled by remote service: {0}")]
    Throttled(String),
    #[error("remote service error {code}: {message}")]
    Service { code: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True when the error is a rate-limit signal and deserves the throttle backoff schedule.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Throttled(_) => true,
            Self::Service { code, message } => {
                THROTTLING_CODES.contains(&code.as_str()) || message.contains("429")
            }
            Self::Transport(message) => message.contains("429"),
        }
    }
}

/// Why a single price lookup did not produce a determination.
///
/// Never crosses the batch boundary: callers of the batch API only see `None`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("remote lookup failed after {attempts} attempts: {source}")]
    Remote {
        attempts: u32,
        #[source]
        source: RemoteError,
    },
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigurationError),
}

/// Configuration rejected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid lease length: {0} (expected 1yr or 3yr)")]
    InvalidLeaseLength(String),
    #[error("invalid payment option: {0} (expected no_upfront, partial_upfront or all_upfront)")]
    InvalidPaymentOption(String),
    #[error("invalid price kind: {0}")]
    InvalidPriceKind(String),
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Internal cache failures. Logged and folded into MISS / no-op by `PriceCache`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupted cache entry {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}
