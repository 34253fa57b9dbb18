//! Selection of an hourly price out of raw price-list documents.
//!
//! All functions here are pure: they never touch the cache or the network. Malformed
//! documents and malformed numeric strings are skipped, never propagated.

use crate::types::conversions::positive_price;
use crate::types::{Currency, LeaseLength, PaymentOption, PriceDimension, PriceListDocument, PriceTerm, JPY_PER_USD};
use log::debug;

/// Which terms of a document are eligible.
#[derive(Debug, Clone, Copy)]
pub enum TermFilter {
    OnDemand,
    Reserved {
        lease: LeaseLength,
        payment: PaymentOption,
    },
    SavingsPlan {
        lease: LeaseLength,
    },
}

impl TermFilter {
    fn matches(&self, term: &PriceTerm) -> bool {
        match self {
            Self::OnDemand => true,
            Self::Reserved { lease, payment } => {
                term.attribute("LeaseContractLength") == lease.api_value()
                    && term.attribute("PurchaseOption") == payment.api_value()
                    && term.attribute("OfferingClass") == "standard"
            }
            Self::SavingsPlan { lease } => {
                term.attribute("LeaseContractLength") == lease.api_value()
                    && term.attribute("PurchaseOption") == PaymentOption::NoUpfront.api_value()
            }
        }
    }

    fn is_hourly(&self, dimension: &PriceDimension) -> bool {
        let unit = dimension.unit.as_str();
        match self {
            // on-demand dimensions occasionally come without a unit
            Self::OnDemand => unit.contains("Hr") || unit.is_empty(),
            _ => unit.contains("Hr"),
        }
    }
}

/// Parses raw documents, skipping (and logging) anything that is not valid JSON.
pub fn parse_documents(raw: &[String]) -> Vec<PriceListDocument> {
    raw.iter()
        .filter_map(|item| match PriceListDocument::parse(item) {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!("Skipping malformed price list document: {}", e);
                None
            }
        })
        .collect()
}

/// Hourly price of a dimension in USD. A JPY-only price is converted at [`JPY_PER_USD`].
pub fn dimension_usd_price(dimension: &PriceDimension) -> Option<f64> {
    let (raw, currency) = dimension.priced_amount()?;
    let price = positive_price(raw)?;
    match currency {
        Currency::Usd => Some(price),
        Currency::Jpy => {
            let usd = price / JPY_PER_USD;
            debug!("Converted JPY price {} to USD {:.6} at {} JPY/USD", raw, usd, JPY_PER_USD);
            Some(usd)
        }
    }
}

/// Minimum positive hourly USD price over every matching dimension of every document whose
/// location contains `location` (case-insensitive).
pub fn min_hourly_price(documents: &[PriceListDocument], location: &str, filter: TermFilter) -> Option<f64> {
    let wanted = location.to_lowercase();
    let mut best: Option<f64> = None;

    for doc in documents {
        if !doc.location().to_lowercase().contains(&wanted) {
            continue;
        }
        let terms = match filter {
            TermFilter::OnDemand => &doc.terms.on_demand,
            _ => &doc.terms.reserved,
        };
        for term in terms.values().filter(|t| filter.matches(t)) {
            for dimension in term.price_dimensions.values() {
                if !filter.is_hourly(dimension) {
                    continue;
                }
                let Some(price) = dimension_usd_price(dimension) else {
                    continue;
                };
                if best.map_or(true, |b| price < b) {
                    best = Some(price);
                }
            }
        }
    }
    best
}
