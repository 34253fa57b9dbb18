//! Domain types shared by the cache, the fetcher and the orchestrator.

pub mod conversions;
pub mod price_kind;
pub mod price_list;

pub use price_kind::{LeaseLength, PaymentOption, PriceKind};
pub use price_list::{Currency, PriceDimension, PriceListDocument, PriceTerm, JPY_PER_USD};
