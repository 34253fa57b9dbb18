//! # Price Fetcher
//!
//! Single price lookups against the remote pricing service with read-through and
//! write-through caching.
//!
//! ## Retry policy
//!
//! Every remote call is attempted at most `max_retries + 1` times, strictly sequentially.
//! Between attempts the fetcher sleeps:
//!
//! - rate-limit errors: `2^attempt + attempt * 0.5` seconds
//! - any other remote error: `2^attempt` seconds
//!
//! Exhausted retries resolve to "unavailable": `null` is cached and the batch boundary only
//! sees `None`. Sleeps use `tokio::time`, so dropping the future mid-retry aborts it before
//! any cache write.

use crate::cache::{CacheLookup, PriceCache};
use crate::errors::{ConfigurationError, FetchError, RemoteError};
use crate::metrics;
use crate::observer::{NoopObserver, PricingObserver};
use crate::price_extraction::{min_hourly_price, parse_documents, TermFilter};
use crate::pricing_client::{PricingClient, ProductQuery, SpotPriceObservation, SpotPricePage, SpotPriceQuery};
use crate::region_map::LocationResolver;
use crate::settings::Settings;
use crate::spot_history::SpotPriceHistory;
use crate::types::conversions::positive_price;
use crate::types::PriceKind;
use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Continuation-token safety cap for spot price pagination.
const MAX_SPOT_PAGES: usize = 100;
/// Keeps `2^attempt` finite for absurd retry counts.
const MAX_BACKOFF_EXPONENT: u32 = 10;
const SPOT_PAGE_SIZE: u32 = 1000;
const PRE_INSTALLED_SW_NONE: &str = "NA";

/// Delay before the retry that follows failed attempt `attempt` (0-based).
pub fn backoff_delay(attempt: u32, rate_limited: bool) -> Duration {
    let exp = attempt.min(MAX_BACKOFF_EXPONENT);
    let base = f64::from(1u32 << exp);
    if rate_limited {
        Duration::from_secs_f64(base + f64::from(exp) * 0.5)
    } else {
        Duration::from_secs_f64(base)
    }
}

/// On-demand, spot and savings-plan prices for one instance type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstancePricing {
    pub on_demand: Option<f64>,
    pub spot: Option<f64>,
    pub savings_1yr: Option<f64>,
    pub savings_3yr: Option<f64>,
}

pub struct PriceFetcher<C: PricingClient> {
    client: Arc<C>,
    cache: Option<Arc<PriceCache>>,
    resolver: LocationResolver,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    spot_batch_size: usize,
}

impl<C: PricingClient> Clone for PriceFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            cache: self.cache.clone(),
            resolver: self.resolver,
            limiter: self.limiter.clone(),
            spot_batch_size: self.spot_batch_size,
        }
    }
}

impl<C: PricingClient> PriceFetcher<C> {
    /// Fetcher with no rate limit, no region fallback and the default spot batch size.
    pub fn new(client: Arc<C>, cache: Option<Arc<PriceCache>>) -> Self {
        Self {
            client,
            cache,
            resolver: LocationResolver::default(),
            limiter: None,
            spot_batch_size: Settings::default().spot_batch_size,
        }
    }

    /// Fetcher configured from `settings`. The cache is only attached when `use_cache` is set.
    pub fn from_settings(
        client: Arc<C>,
        cache: Option<Arc<PriceCache>>,
        settings: &Settings,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let mut fetcher = Self::new(client, cache.filter(|_| settings.use_cache))
            .with_location_resolver(LocationResolver::new(settings.region_identity_fallback))
            .with_spot_batch_size(settings.spot_batch_size);
        if let Some(rps) = settings.requests_per_second.and_then(NonZeroU32::new) {
            fetcher = fetcher.with_rate_limit(rps);
        }
        Ok(fetcher)
    }

    pub fn with_location_resolver(mut self, resolver: LocationResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Caps remote calls (every page and every retry counts) at `per_second`.
    pub fn with_rate_limit(mut self, per_second: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_second(per_second))));
        self
    }

    pub fn with_spot_batch_size(mut self, size: usize) -> Self {
        self.spot_batch_size = size.max(1);
        self
    }

    pub fn cache(&self) -> Option<&Arc<PriceCache>> {
        self.cache.as_ref()
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub async fn fetch_on_demand(&self, instance_type: &str, region: &str, max_retries: u32) -> Option<f64> {
        self.fetch(instance_type, region, PriceKind::OnDemand, max_retries, &NoopObserver)
            .await
    }

    pub async fn fetch_spot(&self, instance_type: &str, region: &str, max_retries: u32) -> Option<f64> {
        self.fetch(instance_type, region, PriceKind::Spot, max_retries, &NoopObserver)
            .await
    }

    /// Reserved-instance price. `lease` is `1yr`/`3yr`, `payment` one of `no_upfront`,
    /// `partial_upfront`, `all_upfront`; anything else returns `None` without a remote call.
    pub async fn fetch_reserved(
        &self,
        instance_type: &str,
        region: &str,
        lease: &str,
        payment: &str,
        max_retries: u32,
    ) -> Option<f64> {
        match PriceKind::reserved(lease, payment) {
            Ok(kind) => self.fetch(instance_type, region, kind, max_retries, &NoopObserver).await,
            Err(e) => {
                error!("Reserved instance lookup for {} rejected: {}", instance_type, e);
                None
            }
        }
    }

    pub async fn fetch_savings_plan(
        &self,
        instance_type: &str,
        region: &str,
        lease: &str,
        max_retries: u32,
    ) -> Option<f64> {
        match PriceKind::savings_plan(lease) {
            Ok(kind) => self.fetch(instance_type, region, kind, max_retries, &NoopObserver).await,
            Err(e) => {
                error!("Savings plan lookup for {} rejected: {}", instance_type, e);
                None
            }
        }
    }

    /// On-demand, spot and both savings-plan prices, fetched concurrently.
    pub async fn fetch_pricing(&self, instance_type: &str, region: &str, max_retries: u32) -> InstancePricing {
        let (on_demand, spot, savings_1yr, savings_3yr) = tokio::join!(
            self.fetch_on_demand(instance_type, region, max_retries),
            self.fetch_spot(instance_type, region, max_retries),
            self.fetch_savings_plan(instance_type, region, "1yr", max_retries),
            self.fetch_savings_plan(instance_type, region, "3yr", max_retries),
        );
        InstancePricing {
            on_demand,
            spot,
            savings_1yr,
            savings_3yr,
        }
    }

    /// [`try_fetch`](Self::try_fetch) with the failure reason logged and dropped.
    pub async fn fetch(
        &self,
        instance_type: &str,
        region: &str,
        kind: PriceKind,
        max_retries: u32,
        observer: &dyn PricingObserver,
    ) -> Option<f64> {
        match self.try_fetch(instance_type, region, kind, max_retries, observer).await {
            Ok(price) => price,
            Err(e) => {
                warn!("{} price for {} in {} unavailable: {}", kind.label(), instance_type, region, e);
                None
            }
        }
    }

    /// One lookup: cache read-through, remote call with retries, cache write-through.
    ///
    /// `Ok(None)` means the service confirmed there is no matching price. `Err` means the
    /// retries ran out; `null` has already been cached in that case too.
    pub async fn try_fetch(
        &self,
        instance_type: &str,
        region: &str,
        kind: PriceKind,
        max_retries: u32,
        observer: &dyn PricingObserver,
    ) -> Result<Option<f64>, FetchError> {
        if let Some(cache) = &self.cache {
            if let CacheLookup::Hit(price) = cache.get(region, instance_type, kind) {
                debug!("Using cached {} price for {}: {:?}", kind, instance_type, price);
                observer.on_cache_hit().await;
                return Ok(price);
            }
        }

        let outcome = match kind {
            PriceKind::Spot => {
                let types = [instance_type.to_string()];
                self.with_retries(instance_type, max_retries, || self.latest_spot_prices(region, &types, true))
                    .await
                    .map(|prices| prices.get(instance_type).copied())
            }
            _ => {
                let Some(location) = self.resolver.resolve(region) else {
                    warn!("No pricing location for region {}, treating {} as unavailable", region, instance_type);
                    self.store(region, instance_type, kind, None);
                    return Ok(None);
                };
                let query = product_query(&location, instance_type, kind);
                self.with_retries(instance_type, max_retries, || self.remote_products(&query))
                    .await
                    .map(|raw| min_hourly_price(&parse_documents(&raw), &location, term_filter(kind)))
            }
        };

        match &outcome {
            Ok(price) => {
                debug!("Resolved {} price for {} in {}: {:?}", kind, instance_type, region, price);
                self.store(region, instance_type, kind, *price);
            }
            Err(_) => {
                metrics::increment_fetch_exhausted(kind.label());
                self.store(region, instance_type, kind, None);
            }
        }
        outcome
    }

    /// Current spot prices for many instance types.
    ///
    /// Cached types are answered locally; the rest are requested in chunks of the configured
    /// spot batch size. Every requested type is present in the result.
    pub async fn fetch_spot_batch(
        &self,
        instance_types: &[String],
        region: &str,
        max_retries: u32,
    ) -> IndexMap<String, Option<f64>> {
        let mut results: IndexMap<String, Option<f64>> = IndexMap::with_capacity(instance_types.len());
        let mut misses: Vec<String> = Vec::new();

        for instance_type in instance_types {
            if results.contains_key(instance_type) {
                continue;
            }
            let lookup = match &self.cache {
                Some(cache) => cache.get(region, instance_type, PriceKind::Spot),
                None => CacheLookup::Miss,
            };
            match lookup {
                CacheLookup::Hit(price) => {
                    results.insert(instance_type.clone(), price);
                }
                CacheLookup::Miss => {
                    // reserve the input position
                    results.insert(instance_type.clone(), None);
                    misses.push(instance_type.clone());
                }
            }
        }

        if misses.is_empty() {
            debug!("All {} spot prices served from cache", results.len());
            return results;
        }
        info!(
            "Fetching spot prices for {} instance types in {} ({} from cache)",
            misses.len(),
            region,
            results.len() - misses.len()
        );

        for chunk in misses.chunks(self.spot_batch_size) {
            let strategy = ExponentialBackoff::from_millis(2)
                .factor(500)
                .take(max_retries as usize);
            let fetched = Retry::start(strategy, || self.latest_spot_prices(region, chunk, false)).await;

            let prices = match fetched {
                Ok(prices) => prices,
                Err(e) => {
                    warn!("Spot price chunk of {} types failed after retries: {}", chunk.len(), e);
                    HashMap::new()
                }
            };
            for instance_type in chunk {
                let price = prices.get(instance_type).copied();
                self.store(region, instance_type, PriceKind::Spot, price);
                results.insert(instance_type.clone(), price);
            }
        }

        results
    }

    /// Spot price history over the last `days` days. Not cached; `None` on any failure or
    /// when the service has no observations.
    pub async fn fetch_spot_history(&self, instance_type: &str, region: &str, days: u32) -> Option<SpotPriceHistory> {
        let mut query = SpotPriceQuery::new(region, vec![instance_type.to_string()]);
        query.start_time = Some(Utc::now() - chrono::Duration::days(i64::from(days)));

        match self.collect_spot_pages(query).await {
            Ok(observations) => SpotPriceHistory::from_observations(instance_type, region, days, &observations),
            Err(e) => {
                debug!("Error fetching spot price history for {}: {}", instance_type, e);
                None
            }
        }
    }

    fn store(&self, region: &str, instance_type: &str, kind: PriceKind, price: Option<f64>) {
        if let Some(cache) = &self.cache {
            cache.set(region, instance_type, kind, price);
        }
    }

    async fn with_retries<T, F, Fut>(&self, instance_type: &str, max_retries: u32, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let rate_limited = err.is_rate_limited();

            if attempt >= max_retries {
                let attempts = attempt + 1;
                warn!("Giving up on {} after {} attempts: {}", instance_type, attempts, err);
                return Err(if rate_limited {
                    FetchError::RateLimited { attempts }
                } else {
                    FetchError::Remote { attempts, source: err }
                });
            }

            let delay = backoff_delay(attempt, rate_limited);
            debug!(
                "{} for {}, retrying in {:.1}s (attempt {}/{})",
                if rate_limited { "Rate limited" } else { "Remote error" },
                instance_type,
                delay.as_secs_f64(),
                attempt + 1,
                max_retries
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn acquire_permit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn remote_products(&self, query: &ProductQuery) -> Result<Vec<String>, RemoteError> {
        self.acquire_permit().await;
        metrics::increment_pricing_api_call("get_products");
        let result = self.client.get_products(query).await;
        if matches!(&result, Err(e) if e.is_rate_limited()) {
            metrics::increment_pricing_throttled("get_products");
        }
        result
    }

    async fn remote_spot_page(&self, query: &SpotPriceQuery) -> Result<SpotPricePage, RemoteError> {
        self.acquire_permit().await;
        metrics::increment_pricing_api_call("describe_spot_price_history");
        let result = self.client.describe_spot_price_history(query).await;
        if matches!(&result, Err(e) if e.is_rate_limited()) {
            metrics::increment_pricing_throttled("describe_spot_price_history");
        }
        result
    }

    /// Follows continuation tokens, stopping at [`MAX_SPOT_PAGES`].
    async fn collect_spot_pages(&self, mut query: SpotPriceQuery) -> Result<Vec<SpotPriceObservation>, RemoteError> {
        let mut observations = Vec::new();
        for page_number in 1..=MAX_SPOT_PAGES {
            let page = self.remote_spot_page(&query).await?;
            observations.extend(page.observations);
            match page.next_token.filter(|token| !token.is_empty()) {
                Some(token) => query.next_token = Some(token),
                None => return Ok(observations),
            }
            if page_number == MAX_SPOT_PAGES {
                warn!("Spot price pagination hit the {} page cap, using partial results", MAX_SPOT_PAGES);
            }
        }
        Ok(observations)
    }

    /// Most recent observed spot price per instance type.
    async fn latest_spot_prices(
        &self,
        region: &str,
        instance_types: &[String],
        single: bool,
    ) -> Result<HashMap<String, f64>, RemoteError> {
        let mut query = SpotPriceQuery::new(region, instance_types.to_vec());
        query.start_time = Some(Utc::now());
        query.max_results = Some(if single { 1 } else { SPOT_PAGE_SIZE });
        let observations = if single {
            self.remote_spot_page(&query).await?.observations
        } else {
            self.collect_spot_pages(query).await?
        };
        Ok(latest_per_type(&observations))
    }
}

fn latest_per_type(observations: &[SpotPriceObservation]) -> HashMap<String, f64> {
    let mut latest: HashMap<String, (chrono::DateTime<Utc>, f64)> = HashMap::new();
    for obs in observations {
        let Some(price) = positive_price(&obs.price) else {
            continue;
        };
        latest
            .entry(obs.instance_type.clone())
            .and_modify(|current| {
                if obs.timestamp > current.0 {
                    *current = (obs.timestamp, price);
                }
            })
            .or_insert((obs.timestamp, price));
    }
    latest.into_iter().map(|(ty, (_, price))| (ty, price)).collect()
}

fn term_filter(kind: PriceKind) -> TermFilter {
    match kind {
        PriceKind::Reserved { lease, payment } => TermFilter::Reserved { lease, payment },
        PriceKind::SavingsPlan { lease } => TermFilter::SavingsPlan { lease },
        PriceKind::OnDemand | PriceKind::Spot => TermFilter::OnDemand,
    }
}

fn product_query(location: &str, instance_type: &str, kind: PriceKind) -> ProductQuery {
    let query = ProductQuery::new(location, instance_type);
    match kind {
        PriceKind::Reserved { .. } | PriceKind::SavingsPlan { .. } => query.with_pre_installed_sw(PRE_INSTALLED_SW_NONE),
        _ => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0, false), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, false), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, false), Duration::from_secs(8));
        assert_eq!(backoff_delay(0, true), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, true), Duration::from_secs_f64(2.5));
        assert_eq!(backoff_delay(2, true), Duration::from_secs_f64(5.0));
        // capped
        assert_eq!(backoff_delay(u32::MAX, false), backoff_delay(MAX_BACKOFF_EXPONENT, false));
    }

    #[test]
    fn test_latest_per_type_prefers_newest_observation() {
        let at = |hour| Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
        let observations = vec![
            SpotPriceObservation {
                instance_type: "m5.large".into(),
                availability_zone: Some("us-east-1a".into()),
                price: "0.040".into(),
                timestamp: at(1),
            },
            SpotPriceObservation {
                instance_type: "m5.large".into(),
                availability_zone: Some("us-east-1b".into()),
                price: "0.035".into(),
                timestamp: at(3),
            },
            SpotPriceObservation {
                instance_type: "c5.large".into(),
                availability_zone: None,
                price: "bogus".into(),
                timestamp: at(2),
            },
        ];
        let latest = latest_per_type(&observations);
        assert_eq!(latest.get("m5.large"), Some(&0.035));
        assert!(!latest.contains_key("c5.large"));
    }

    #[test]
    fn test_reserved_queries_exclude_preinstalled_software() {
        let kind = PriceKind::reserved("1yr", "all_upfront").unwrap();
        let query = product_query("EU (Ireland)", "m5.large", kind);
        assert_eq!(query.pre_installed_sw.as_deref(), Some("NA"));
        assert!(product_query("EU (Ireland)", "m5.large", PriceKind::OnDemand)
            .pre_installed_sw
            .is_none());
    }
}
