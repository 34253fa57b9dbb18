//! # Pricing Client Trait
//!
//! The remote pricing service is an external collaborator. This module defines the
//! request/response shapes [`PriceFetcher`](crate::price_fetcher::PriceFetcher) consumes and
//! the [`PricingClient`] trait a transport implements. No transport ships with the crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use instancepedia_pricing::errors::RemoteError;
//! use instancepedia_pricing::pricing_client::{PricingClient, ProductQuery, SpotPricePage, SpotPriceQuery};
//! use async_trait::async_trait;
//!
//! struct StaticClient;
//!
//! #[async_trait]
//! impl PricingClient for StaticClient {
//!     async fn get_products(&self, _query: &ProductQuery) -> Result<Vec<String>, RemoteError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn describe_spot_price_history(
//!         &self,
//!         _query: &SpotPriceQuery,
//!     ) -> Result<SpotPricePage, RemoteError> {
//!         Ok(SpotPricePage::default())
//!     }
//! }
//! ```

use crate::errors::RemoteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EC2_SERVICE_CODE: &str = "AmazonEC2";
pub const DEFAULT_TENANCY: &str = "Shared";
pub const DEFAULT_OPERATING_SYSTEM: &str = "Linux";
pub const LINUX_PRODUCT_DESCRIPTION: &str = "Linux/UNIX";
pub const PRODUCT_MAX_RESULTS: u32 = 10;

/// Filters for a price-list lookup (`GetProducts` style: all filters are exact term matches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductQuery {
    pub service_code: String,
    /// Pricing location name, e.g. `US East (N. Virginia)`
    pub location: String,
    pub instance_type: String,
    pub tenancy: String,
    pub operating_system: String,
    /// `NA` for reserved/savings lookups, unset for on-demand
    pub pre_installed_sw: Option<String>,
    pub max_results: u32,
}

impl ProductQuery {
    pub fn new(location: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            service_code: EC2_SERVICE_CODE.to_string(),
            location: location.into(),
            instance_type: instance_type.into(),
            tenancy: DEFAULT_TENANCY.to_string(),
            operating_system: DEFAULT_OPERATING_SYSTEM.to_string(),
            pre_installed_sw: None,
            max_results: PRODUCT_MAX_RESULTS,
        }
    }

    pub fn with_pre_installed_sw(mut self, value: impl Into<String>) -> Self {
        self.pre_installed_sw = Some(value.into());
        self
    }
}

/// Regional spot price history request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotPriceQuery {
    pub region: String,
    pub instance_types: Vec<String>,
    pub product_descriptions: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

impl SpotPriceQuery {
    pub fn new(region: impl Into<String>, instance_types: Vec<String>) -> Self {
        Self {
            region: region.into(),
            instance_types,
            product_descriptions: vec![LINUX_PRODUCT_DESCRIPTION.to_string()],
            start_time: None,
            max_results: None,
            next_token: None,
        }
    }
}

/// One spot price data point. `price` is the service's decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPriceObservation {
    pub instance_type: String,
    pub availability_zone: Option<String>,
    pub price: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotPricePage {
    pub observations: Vec<SpotPriceObservation>,
    pub next_token: Option<String>,
}

/// Transport to the remote pricing service.
///
/// Implementations must be cheap to share across concurrent lookups (`Send + Sync`); the
/// fetcher holds them behind an `Arc`. Throttling must be reported in a form
/// [`RemoteError::is_rate_limited`] recognises so the throttle backoff applies.
#[async_trait]
pub trait PricingClient: Send + Sync {
    /// Raw JSON price-list documents matching the query.
    async fn get_products(&self, query: &ProductQuery) -> Result<Vec<String>, RemoteError>;

    /// One page of spot price history.
    async fn describe_spot_price_history(&self, query: &SpotPriceQuery) -> Result<SpotPricePage, RemoteError>;
}
