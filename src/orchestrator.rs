//! # Batch Orchestrator
//!
//! Fans many price lookups out under a bounded concurrency budget and aggregates the results
//! with per-batch metrics.
//!
//! ## Overview
//!
//! Each distinct instance type becomes one unit of work. A unit:
//! 1. waits for a permit (at most `concurrency` units are in flight),
//! 2. sleeps for the pacing delay,
//! 3. probes the cache (without mutating it) to attribute the lookup as a hit or an API call,
//! 4. runs the fetch, which never fails past this point,
//! 5. reports `on_price` and then `on_progress`.
//!
//! All units are polled cooperatively on the calling task. Metrics are frozen once every
//! unit has completed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use instancepedia_pricing::orchestrator::{BatchOptions, BatchOrchestrator};
//! use instancepedia_pricing::observer::NoopObserver;
//! use instancepedia_pricing::types::PriceKind;
//!
//! # async fn run<C: instancepedia_pricing::pricing_client::PricingClient>(
//! #     orchestrator: BatchOrchestrator<C>,
//! #     settings: instancepedia_pricing::settings::Settings,
//! # ) {
//! let types = vec!["t3.micro".to_string(), "m5.large".to_string()];
//! let result = orchestrator
//!     .fetch_batch(&types, "us-east-1", PriceKind::OnDemand, &BatchOptions::for_cli(&settings), &NoopObserver)
//!     .await;
//! println!("{} priced, {:.1}% cache hits", result.priced().len(), result.metrics.cache_hit_rate());
//! # }
//! ```

use crate::batch_metrics::{BatchMetrics, MetricsSnapshot};
use crate::metrics;
use crate::observer::PricingObserver;
use crate::price_fetcher::PriceFetcher;
use crate::pricing_client::PricingClient;
use crate::settings::Settings;
use crate::types::PriceKind;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, info_span, Instrument};

/// Knobs for one batch call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Max units in flight. Zero is treated as one.
    pub concurrency: usize,
    /// Pacing delay before every unit's fetch, independent of retry backoff.
    pub request_delay: Duration,
    pub max_retries: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl BatchOptions {
    /// Interactive budget (`pricing_concurrency`).
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.pricing_concurrency,
            request_delay: settings.request_delay(),
            max_retries: settings.max_retries,
        }
    }

    /// Command-line budget (`cli_pricing_concurrency`).
    pub fn for_cli(settings: &Settings) -> Self {
        Self {
            concurrency: settings.cli_pricing_concurrency,
            ..Self::from_settings(settings)
        }
    }

    /// Budget for re-fetching prices that failed earlier (`pricing_retry_concurrency`).
    pub fn for_retry(settings: &Settings) -> Self {
        Self {
            concurrency: settings.pricing_retry_concurrency,
            ..Self::from_settings(settings)
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Outcome of a batch: one entry per distinct requested instance type, in first-seen order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub prices: IndexMap<String, Option<f64>>,
    pub metrics: MetricsSnapshot,
}

impl BatchResult {
    pub fn priced(&self) -> Vec<(&str, f64)> {
        self.prices
            .iter()
            .filter_map(|(ty, price)| price.map(|p| (ty.as_str(), p)))
            .collect()
    }

    pub fn unpriced(&self) -> Vec<&str> {
        self.prices
            .iter()
            .filter(|(_, price)| price.is_none())
            .map(|(ty, _)| ty.as_str())
            .collect()
    }

    pub fn get(&self, instance_type: &str) -> Option<f64> {
        self.prices.get(instance_type).copied().flatten()
    }
}

/// Shared state of one batch call. Dropped when the call returns.
struct BatchRun<'a> {
    region: &'a str,
    kind: PriceKind,
    options: &'a BatchOptions,
    observer: &'a dyn PricingObserver,
    semaphore: Semaphore,
    metrics: BatchMetrics,
    completed: AtomicUsize,
    total: usize,
}

pub struct BatchOrchestrator<C: PricingClient> {
    fetcher: PriceFetcher<C>,
}

impl<C: PricingClient> BatchOrchestrator<C> {
    pub fn new(fetcher: PriceFetcher<C>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &PriceFetcher<C> {
        &self.fetcher
    }

    /// Prices every distinct instance type in `instance_types`.
    ///
    /// Never fails: a unit whose lookup fails resolves to `None` and is counted as a failed
    /// fetch. The returned map always has exactly one entry per distinct input.
    pub async fn fetch_batch(
        &self,
        instance_types: &[String],
        region: &str,
        kind: PriceKind,
        options: &BatchOptions,
        observer: &dyn PricingObserver,
    ) -> BatchResult {
        let unique: IndexSet<&str> = instance_types.iter().map(String::as_str).collect();
        if unique.len() != instance_types.len() {
            debug!("Coalesced {} duplicate instance types", instance_types.len() - unique.len());
        }

        let span = info_span!("pricing_batch", region = region, kind = %kind, total = unique.len());
        self.run_batch(unique, region, kind, options, observer)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        unique: IndexSet<&str>,
        region: &str,
        kind: PriceKind,
        options: &BatchOptions,
        observer: &dyn PricingObserver,
    ) -> BatchResult {
        let concurrency = options.concurrency.max(1);
        info!(
            "Starting batch pricing fetch: {} instances, concurrency={}, delay={}ms",
            unique.len(),
            concurrency,
            options.request_delay.as_millis()
        );

        let run = BatchRun {
            region,
            kind,
            options,
            observer,
            semaphore: Semaphore::new(concurrency),
            metrics: BatchMetrics::new(),
            completed: AtomicUsize::new(0),
            total: unique.len(),
        };

        let outcomes = join_all(unique.iter().map(|instance_type| self.run_unit(&run, instance_type))).await;
        run.metrics.finish();

        let prices: IndexMap<String, Option<f64>> = unique
            .iter()
            .zip(outcomes)
            .map(|(ty, price)| (ty.to_string(), price))
            .collect();
        let snapshot = run.metrics.snapshot();

        info!(
            "Batch pricing fetch completed in {:.2}s: {}/{} prices fetched ({:.1}% success rate, {:.1}% cache hits)",
            snapshot.elapsed.as_secs_f64(),
            snapshot.successful_fetches,
            run.total,
            snapshot.success_rate(),
            snapshot.cache_hit_rate()
        );
        if !snapshot.elapsed.is_zero() {
            info!("Performance: {:.1} requests/second", snapshot.throughput());
        }
        metrics::record_batch_duration(snapshot.elapsed);
        metrics::record_batch_size(run.total);

        BatchResult {
            prices,
            metrics: snapshot,
        }
    }

    async fn run_unit(&self, run: &BatchRun<'_>, instance_type: &str) -> Option<f64> {
        // the semaphore is owned by this batch and never closed
        let _permit = run.semaphore.acquire().await.ok();

        if !run.options.request_delay.is_zero() {
            sleep(run.options.request_delay).await;
        }

        // An entry that expires between this probe and the fetch's own read is counted as a
        // hit even though the fetch then goes remote.
        let cached = self
            .fetcher
            .cache()
            .map_or(false, |cache| cache.probe(run.region, instance_type, run.kind));
        if cached {
            run.metrics.record_cache_hit();
        } else {
            run.metrics.record_api_call();
        }

        let price = self
            .fetcher
            .fetch(instance_type, run.region, run.kind, run.options.max_retries, run.observer)
            .await;
        run.metrics.record_outcome(price);

        run.observer.on_price(instance_type, price).await;
        // counted after the price is delivered so progress never runs ahead of prices
        let completed = run.completed.fetch_add(1, Ordering::SeqCst) + 1;
        run.observer.on_progress(completed, run.total).await;
        price
    }
}
