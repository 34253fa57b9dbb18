//! Scripted pricing client shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use instancepedia_pricing::errors::RemoteError;
use instancepedia_pricing::pricing_client::{
    PricingClient, ProductQuery, SpotPriceObservation, SpotPricePage, SpotPriceQuery,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the mock answers a product lookup for one instance type.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// One document per entry, each carrying on-demand and reserved terms
    Documents(Vec<String>),
    /// Service answers with an empty price list
    NoMatch,
    Throttle,
    Fail,
    /// Throttles the first `n` calls, then answers with the documents
    ThrottleThen(u32, Vec<String>),
}

pub struct MockPricingClient {
    behaviors: HashMap<String, Behavior>,
    spot: Vec<SpotPriceObservation>,
    spot_page_size: usize,
    spot_failures: AtomicU32,
    latency: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    pub product_queries: Mutex<Vec<ProductQuery>>,
    pub spot_queries: Mutex<Vec<SpotPriceQuery>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockPricingClient {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            spot: Vec::new(),
            spot_page_size: usize::MAX,
            spot_failures: AtomicU32::new(0),
            latency: Duration::ZERO,
            attempts: Mutex::new(HashMap::new()),
            product_queries: Mutex::new(Vec::new()),
            spot_queries: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, instance_type: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(instance_type.to_string(), behavior);
        self
    }

    /// On-demand price only.
    pub fn with_price(self, instance_type: &str, price: &str) -> Self {
        self.with(instance_type, Behavior::Documents(vec![on_demand_doc(price)]))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_spot(mut self, observations: Vec<SpotPriceObservation>) -> Self {
        self.spot = observations;
        self
    }

    pub fn with_spot_page_size(mut self, size: usize) -> Self {
        self.spot_page_size = size;
        self
    }

    pub fn with_spot_failures(self, failures: u32) -> Self {
        self.spot_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn product_calls(&self) -> usize {
        self.product_queries.lock().unwrap().len()
    }

    pub fn spot_calls(&self) -> usize {
        self.spot_queries.lock().unwrap().len()
    }

    pub fn calls_for(&self, instance_type: &str) -> usize {
        self.product_queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.instance_type == instance_type)
            .count()
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PricingClient for MockPricingClient {
    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<String>, RemoteError> {
        self.product_queries.lock().unwrap().push(query.clone());
        self.simulate_latency().await;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(query.instance_type.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let location = &query.location;
        match self.behaviors.get(&query.instance_type) {
            None | Some(Behavior::NoMatch) => Ok(vec![]),
            Some(Behavior::Documents(docs)) => Ok(docs.iter().map(|d| d.replace(LOCATION_PLACEHOLDER, location)).collect()),
            Some(Behavior::Throttle) => Err(RemoteError::service("ThrottlingException", "Rate exceeded")),
            Some(Behavior::Fail) => Err(RemoteError::service("InternalFailure", "backend unavailable")),
            Some(Behavior::ThrottleThen(n, docs)) => {
                if attempt <= *n {
                    Err(RemoteError::Throttled("slow down".into()))
                } else {
                    Ok(docs.iter().map(|d| d.replace(LOCATION_PLACEHOLDER, location)).collect())
                }
            }
        }
    }

    async fn describe_spot_price_history(&self, query: &SpotPriceQuery) -> Result<SpotPricePage, RemoteError> {
        self.spot_queries.lock().unwrap().push(query.clone());
        self.simulate_latency().await;

        let remaining = self.spot_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.spot_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteError::Transport("connection reset".into()));
        }

        let matching: Vec<SpotPriceObservation> = self
            .spot
            .iter()
            .filter(|obs| query.instance_types.contains(&obs.instance_type))
            .cloned()
            .collect();
        let start: usize = query.next_token.as_deref().map_or(0, |t| t.parse().unwrap());
        let end = start.saturating_add(self.spot_page_size).min(matching.len());
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(SpotPricePage {
            observations: matching[start..end].to_vec(),
            next_token,
        })
    }
}

/// Replaced with the queried location when the mock answers.
pub const LOCATION_PLACEHOLDER: &str = "{{LOCATION}}";

pub fn on_demand_doc(price: &str) -> String {
    json!({
        "product": {"attributes": {"location": LOCATION_PLACEHOLDER, "instanceType": "any"}},
        "terms": {"OnDemand": {"OD1": {"priceDimensions": {
            "D1": {"unit": "Hrs", "pricePerUnit": {"USD": price}}
        }}}}
    })
    .to_string()
}

/// Document with one on-demand term and one reserved term.
pub fn reserved_doc(on_demand: &str, lease: &str, purchase: &str, class: &str, hourly: &str) -> String {
    json!({
        "product": {"attributes": {"location": LOCATION_PLACEHOLDER}},
        "terms": {
            "OnDemand": {"OD1": {"priceDimensions": {
                "D1": {"unit": "Hrs", "pricePerUnit": {"USD": on_demand}}
            }}},
            "Reserved": {"RI1": {
                "termAttributes": {
                    "LeaseContractLength": lease,
                    "PurchaseOption": purchase,
                    "OfferingClass": class
                },
                "priceDimensions": {
                    "R1": {"unit": "Hrs", "pricePerUnit": {"USD": hourly}},
                    "R2": {"unit": "Quantity", "pricePerUnit": {"USD": "250"}}
                }
            }}
        }
    })
    .to_string()
}

pub fn spot_obs(instance_type: &str, timestamp: DateTime<Utc>, price: &str) -> SpotPriceObservation {
    SpotPriceObservation {
        instance_type: instance_type.to_string(),
        availability_zone: Some("us-east-1a".to_string()),
        price: price.to_string(),
        timestamp,
    }
}

pub fn types(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
