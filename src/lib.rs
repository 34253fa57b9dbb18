//! # Instancepedia Pricing
//!
//! Pricing core for EC2 instance lookups against a rate-limited, metered pricing service.
//!
//! ## Overview
//!
//! - **Cache**: file-backed price cache with per-entry TTL. A confirmed "unavailable"
//!   price is cached like any other value.
//! - **Fetching**: single lookups with read-through/write-through caching and exponential
//!   backoff on throttling and remote errors.
//! - **Batching**: concurrency-bounded fan-out of many lookups with pacing delay, progress
//!   notifications and per-batch metrics.
//!
//! ## Architecture
//!
//! ### Cache Layer
//! [`PriceCache`] owns the on-disk records and the lock that guards them.
//!
//! ### Fetch Layer
//! [`PriceFetcher`] talks to a [`PricingClient`] and extracts hourly prices from raw
//! price-list documents. Failures resolve to `None`, never to an error at the batch boundary.
//!
//! ### Batch Layer
//! [`BatchOrchestrator`] drives many fetches and returns a [`BatchResult`] with a frozen
//! [`MetricsSnapshot`].

// Core Types
/// Price kinds, price-list documents and numeric conversions
pub mod types;
/// Error types
pub mod errors;
/// Remote pricing service interface
pub mod pricing_client;

// Cache Layer
/// File-backed TTL price cache
pub mod cache;

// Fetch Layer
/// Region code to pricing location mapping
pub mod region_map;
/// Hourly price selection from price-list documents
pub mod price_extraction;
/// Single price lookups with retries
pub mod price_fetcher;
/// Spot price history statistics
pub mod spot_history;

// Batch Layer
/// Concurrency-bounded batch fetching
pub mod orchestrator;
/// Per-batch counters and rates
pub mod batch_metrics;
/// Progress/price/cache-hit notifications
pub mod observer;

// Infrastructure
/// Process-wide metrics (no-ops without the `observability` feature)
pub mod metrics;
/// Layered configuration
pub mod settings;

pub use batch_metrics::{BatchMetrics, MetricsSnapshot};
pub use cache::{CacheLookup, CacheStats, PriceCache};
pub use errors::{ConfigurationError, FetchError, RemoteError};
pub use observer::{BatchEvent, ChannelObserver, NoopObserver, PricingObserver};
pub use orchestrator::{BatchOptions, BatchOrchestrator, BatchResult};
pub use price_fetcher::PriceFetcher;
pub use pricing_client::PricingClient;
pub use settings::Settings;
pub use types::PriceKind;
