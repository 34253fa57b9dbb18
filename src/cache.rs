use crate::errors::CacheError;
use crate::metrics;
use crate::settings::Settings;
use crate::types::PriceKind;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

const ENTRY_EXTENSION: &str = "json";
const KEY_SEPARATOR: char = '+';

/// One persisted price record.
///
/// Field names match the on-disk JSON layout (`timestamp`, `ttl`, `region`,
/// `instance_type`, `price_type`, `price`). `price: None` is a confirmed "unavailable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Creation time, epoch seconds
    #[serde(rename = "timestamp")]
    pub created_at: f64,
    /// Time to live, seconds
    pub ttl: u64,
    pub region: String,
    pub instance_type: String,
    #[serde(rename = "price_type")]
    pub price_kind: PriceKind,
    pub price: Option<f64>,
}

impl CacheEntry {
    fn age_at(&self, now: f64) -> f64 {
        now - self.created_at
    }

    pub fn is_expired_at(&self, now: f64) -> bool {
        self.age_at(now) > self.ttl as f64
    }

    fn matches(&self, region: &str, instance_type: &str, kind: PriceKind) -> bool {
        self.region == region && self.instance_type == instance_type && self.price_kind == kind
    }
}

/// Result of a cache read. A `Hit(None)` is a cached "unavailable" determination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheLookup {
    Hit(Option<f64>),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Snapshot returned by [`PriceCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub corrupted_entries: usize,
    pub size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// File-backed price cache with per-entry TTL.
///
/// One JSON file per `(region, instance_type, price kind)` fingerprint. Every public
/// operation holds a single coarse lock for the whole storage access, so no caller ever
/// observes a torn entry and `clear`/`stats` see a consistent directory. Writes go to a
/// temporary file that is renamed into place.
#[derive(Debug)]
pub struct PriceCache {
    cache_dir: PathBuf,
    ttl: Duration,
    lock: Mutex<()>,
}

impl PriceCache {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let cache = Self {
            cache_dir: cache_dir.into(),
            ttl,
            lock: Mutex::new(()),
        };
        cache.ensure_cache_dir();
        cache
    }

    /// Cache rooted at the configured (or default user-scoped) directory.
    pub fn open(settings: &Settings) -> Self {
        Self::new(settings.resolved_cache_dir(), settings.cache_ttl())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached value for the fingerprint, or `Miss`.
    ///
    /// Expired and unreadable entries are deleted on the way out.
    pub fn get(&self, region: &str, instance_type: &str, kind: PriceKind) -> CacheLookup {
        let key = cache_key(region, instance_type, kind);
        let path = self.entry_path(&key);
        let _guard = self.lock();

        let lookup = match read_entry(&path) {
            Ok(None) => {
                debug!("Cache miss: {}", key);
                CacheLookup::Miss
            }
            Ok(Some(entry)) if !entry.matches(region, instance_type, kind) => {
                warn!("Cache entry {} holds a different fingerprint, discarding", key);
                remove_quietly(&path);
                CacheLookup::Miss
            }
            Ok(Some(entry)) => {
                let now = epoch_seconds();
                if entry.is_expired_at(now) {
                    debug!(
                        "Cache expired: {} (age: {:.0}s, ttl: {}s)",
                        key,
                        entry.age_at(now),
                        entry.ttl
                    );
                    remove_quietly(&path);
                    CacheLookup::Miss
                } else {
                    debug!("Cache hit: {} (age: {:.0}s)", key, entry.age_at(now));
                    CacheLookup::Hit(entry.price)
                }
            }
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", key, e);
                remove_quietly(&path);
                CacheLookup::Miss
            }
        };

        match lookup {
            CacheLookup::Hit(_) => metrics::increment_cache_hit(kind.label()),
            CacheLookup::Miss => metrics::increment_cache_miss(kind.label()),
        }
        lookup
    }

    /// True if a fresh, readable entry exists. Never deletes anything.
    pub fn probe(&self, region: &str, instance_type: &str, kind: PriceKind) -> bool {
        let path = self.entry_path(&cache_key(region, instance_type, kind));
        let _guard = self.lock();
        match read_entry(&path) {
            Ok(Some(entry)) => {
                entry.matches(region, instance_type, kind) && !entry.is_expired_at(epoch_seconds())
            }
            _ => false,
        }
    }

    /// Stores `price` (or a confirmed "unavailable") with the default TTL. Best effort:
    /// failures are logged, never returned.
    pub fn set(&self, region: &str, instance_type: &str, kind: PriceKind, price: Option<f64>) {
        let key = cache_key(region, instance_type, kind);
        let entry = CacheEntry {
            created_at: epoch_seconds(),
            ttl: self.ttl.as_secs(),
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            price_kind: kind,
            price,
        };

        let _guard = self.lock();
        match self.write_entry(&key, &entry) {
            Ok(()) => debug!("Cached: {} = {:?}", key, price),
            Err(e) => warn!("Failed to write cache entry {}: {}", key, e),
        }
    }

    /// Deletes every entry matching the filters (`None` matches anything) and returns how
    /// many were removed. Unreadable entries are only removed by an unfiltered clear.
    pub fn clear(&self, region: Option<&str>, instance_type: Option<&str>) -> usize {
        let unfiltered = region.is_none() && instance_type.is_none();
        let _guard = self.lock();

        let paths = match self.entry_paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to list cache directory: {}", e);
                return 0;
            }
        };

        let mut count = 0;
        for path in paths {
            let matches = match read_entry(&path) {
                Ok(Some(entry)) => {
                    region.map_or(true, |r| entry.region == r)
                        && instance_type.map_or(true, |t| entry.instance_type == t)
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!("Unreadable cache entry during clear: {}", e);
                    unfiltered
                }
            };
            if !matches {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => count += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to clear cache file {}: {}", path.display(), e),
            }
        }

        info!("Cleared {} cache entries", count);
        count
    }

    /// Scans every entry once. Does not expire anything.
    pub fn stats(&self) -> CacheStats {
        let _guard = self.lock();
        let mut stats = CacheStats::default();

        let paths = match self.entry_paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to list cache directory: {}", e);
                return stats;
            }
        };

        let now = epoch_seconds();
        let mut oldest: Option<f64> = None;
        let mut newest: Option<f64> = None;

        for path in paths {
            stats.total_entries += 1;
            if let Ok(meta) = fs::metadata(&path) {
                stats.size_bytes += meta.len();
            }
            match read_entry(&path) {
                Ok(Some(entry)) => {
                    if entry.is_expired_at(now) {
                        stats.expired_entries += 1;
                    } else {
                        stats.valid_entries += 1;
                    }
                    oldest = Some(oldest.map_or(entry.created_at, |o| o.min(entry.created_at)));
                    newest = Some(newest.map_or(entry.created_at, |n| n.max(entry.created_at)));
                }
                Ok(None) => stats.total_entries -= 1,
                Err(e) => {
                    debug!("Unreadable cache entry during stats: {}", e);
                    stats.corrupted_entries += 1;
                }
            }
        }

        stats.oldest_entry = oldest.and_then(epoch_to_datetime);
        stats.newest_entry = newest.and_then(epoch_to_datetime);
        stats
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // the guarded value is (), so a poisoned lock carries no broken state
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_cache_dir(&self) {
        match fs::create_dir_all(&self.cache_dir) {
            Ok(()) => debug!("Cache directory: {}", self.cache_dir.display()),
            Err(e) => warn!("Failed to create cache directory {}: {}", self.cache_dir.display(), e),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn entry_paths(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e),
        };
        for item in dir {
            let path = item?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let io_err = |source: io::Error| CacheError::Io {
            path: path.clone(),
            source,
        };

        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(io_err)?;
        }
        let mut tmp = NamedTempFile::new_in(&self.cache_dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, entry).map_err(|e| io_err(e.into()))?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Deterministic, collision-free file stem for a fingerprint.
///
/// Each component is escaped (`.` -> `~d`, any other byte outside `[A-Za-z0-9_-]` ->
/// `~u<hex>;`) so the `+` separator can never appear inside a component.
pub fn cache_key(region: &str, instance_type: &str, kind: PriceKind) -> String {
    let mut key = escape_component(region);
    key.push(KEY_SEPARATOR);
    key.push_str(&escape_component(instance_type));
    key.push(KEY_SEPARATOR);
    key.push_str(&escape_component(&kind.cache_discriminator()));
    key
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => out.push(c),
            '.' => out.push_str("~d"),
            other => out.push_str(&format!("~u{:x};", other as u32)),
        }
    }
    out
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| CacheError::Corrupted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove cache file {}: {}", path.display(), e);
        }
    }
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt((seconds * 1000.0) as i64).single()
}
