//! Per-batch performance accounting.
//!
//! Counters are atomics so concurrent units can record without a lock. Derived rates are
//! computed from the counters on every call and never stored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

/// Live accumulator owned by one batch call.
///
/// A confirmed "unavailable" (`None`) price counts as a failed fetch: `successful_fetches`
/// counts lookups that produced a usable price.
#[derive(Debug)]
pub struct BatchMetrics {
    cache_hits: AtomicU64,
    api_calls: AtomicU64,
    successful_fetches: AtomicU64,
    failed_fetches: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
    finished: OnceLock<Instant>,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            successful_fetches: AtomicU64::new(0),
            failed_fetches: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
            finished: OnceLock::new(),
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the outcome of one lookup.
    pub fn record_outcome(&self, price: Option<f64>) {
        match price {
            Some(_) => self.successful_fetches.fetch_add(1, Ordering::Relaxed),
            None => self.failed_fetches.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Freezes the elapsed time. Later calls keep the first end time.
    pub fn finish(&self) {
        let _ = self.finished.set(Instant::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get().is_some()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn successful_fetches(&self) -> u64 {
        self.successful_fetches.load(Ordering::Relaxed)
    }

    pub fn failed_fetches(&self) -> u64 {
        self.failed_fetches.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.cache_hits() + self.api_calls()
    }

    /// Time since start, or frozen at `finish()`.
    pub fn elapsed(&self) -> Duration {
        match self.finished.get() {
            Some(end) => end.saturating_duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        percent(self.cache_hits(), self.total_requests())
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.successful_fetches(), self.total_requests())
    }

    /// Requests per second.
    pub fn throughput(&self) -> f64 {
        per_second(self.total_requests(), self.elapsed())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits(),
            api_calls: self.api_calls(),
            successful_fetches: self.successful_fetches(),
            failed_fetches: self.failed_fetches(),
            started_at: self.started_at,
            elapsed: self.elapsed(),
            finished: self.is_finished(),
        }
    }
}

/// Frozen copy of [`BatchMetrics`] handed back with a batch result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub api_calls: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub finished: bool,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.cache_hits + self.api_calls
    }

    pub fn cache_hit_rate(&self) -> f64 {
        percent(self.cache_hits, self.total_requests())
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.successful_fetches, self.total_requests())
    }

    pub fn throughput(&self) -> f64 {
        per_second(self.total_requests(), self.elapsed)
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::from_std(self.elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_are_zero_without_requests() {
        let metrics = BatchMetrics::new();
        assert_eq!(metrics.total_requests(), 0);
        assert_eq!(metrics.cache_hit_rate(), 0.0);
        assert_eq!(metrics.success_rate(), 0.0);
        metrics.finish();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_counters_and_rates() {
        let metrics = BatchMetrics::new();
        metrics.record_cache_hit();
        metrics.record_api_call();
        metrics.record_api_call();
        metrics.record_api_call();
        metrics.record_outcome(Some(0.05));
        metrics.record_outcome(Some(0.02));
        metrics.record_outcome(None);
        metrics.record_outcome(Some(0.3));

        assert_eq!(metrics.total_requests(), 4);
        assert_eq!(metrics.cache_hit_rate(), 25.0);
        assert_eq!(metrics.success_rate(), 75.0);
        assert_eq!(metrics.failed_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_freezes_elapsed_once() {
        let metrics = BatchMetrics::new();
        metrics.record_api_call();
        metrics.record_api_call();

        tokio::time::advance(Duration::from_secs(2)).await;
        // open-ended while unfinished
        assert_eq!(metrics.elapsed(), Duration::from_secs(2));
        assert_eq!(metrics.throughput(), 1.0);

        metrics.finish();
        tokio::time::advance(Duration::from_secs(3)).await;
        metrics.finish();
        assert_eq!(metrics.elapsed(), Duration::from_secs(2));

        let snapshot = metrics.snapshot();
        assert!(snapshot.finished);
        assert_eq!(snapshot.throughput(), 1.0);
    }

    #[test]
    fn test_parallel_increments_are_not_lost() {
        let metrics = std::sync::Arc::new(BatchMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_api_call();
                        metrics.record_outcome(Some(1.0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.api_calls(), 8000);
        assert_eq!(metrics.successful_fetches(), 8000);
    }
}
