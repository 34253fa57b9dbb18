// src/metrics.rs
//
// Process-wide counters for the pricing subsystem. Emitted through the `metrics` crate when
// the `observability` feature is enabled, no-ops otherwise. Per-batch accounting lives in
// `batch_metrics` and is never global.

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, gauge, histogram};

/// Initializes the descriptions for all pricing metrics.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "pricing_cache_hits_total",
        Unit::Count,
        "Price cache lookups answered from a fresh entry, labeled by price kind."
    );
    describe_counter!(
        "pricing_cache_miss_total",
        Unit::Count,
        "Price cache lookups that found no fresh entry, labeled by price kind."
    );
    describe_counter!(
        "pricing_api_calls_total",
        Unit::Count,
        "Remote pricing calls issued, labeled by operation."
    );
    describe_counter!(
        "pricing_throttled_total",
        Unit::Count,
        "Remote pricing calls rejected with a rate-limit signal, labeled by operation."
    );
    describe_counter!(
        "pricing_fetch_exhausted_total",
        Unit::Count,
        "Lookups that ran out of retries and resolved to unavailable, labeled by price kind."
    );
    describe_histogram!(
        "pricing_batch_duration_seconds",
        Unit::Seconds,
        "Wall time of a full pricing batch."
    );
    describe_histogram!(
        "pricing_batch_size",
        Unit::Count,
        "Distinct instance types submitted per batch."
    );
}

// --- Helper functions to update metrics ---

pub fn increment_cache_hit(price_kind: &str) {
    counter!("pricing_cache_hits_total", 1, "kind" => price_kind.to_string());
}

pub fn increment_cache_miss(price_kind: &str) {
    counter!("pricing_cache_miss_total", 1, "kind" => price_kind.to_string());
}

pub fn increment_pricing_api_call(operation: &'static str) {
    counter!("pricing_api_calls_total", 1, "operation" => operation);
}

pub fn increment_pricing_throttled(operation: &'static str) {
    counter!("pricing_throttled_total", 1, "operation" => operation);
}

pub fn increment_fetch_exhausted(price_kind: &str) {
    counter!("pricing_fetch_exhausted_total", 1, "kind" => price_kind.to_string());
}

pub fn record_batch_duration(duration: std::time::Duration) {
    histogram!("pricing_batch_duration_seconds", duration.as_secs_f64());
}

pub fn record_batch_size(size: usize) {
    histogram!("pricing_batch_size", size as f64);
}

pub fn set_cache_entries(valid: usize) {
    gauge!("pricing_cache_entries", valid as f64);
}
