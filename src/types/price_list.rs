use serde::Deserialize;
use std::collections::HashMap;

/// One price-list document as delivered by the pricing service's `GetProducts` call.
///
/// Only the fields the extractor reads are modelled; everything else is ignored.
/// Every field defaults so that partially-populated documents still deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceListDocument {
    #[serde(default)]
    pub product: Product,
    #[serde(default)]
    pub terms: Terms,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Terms {
    #[serde(rename = "OnDemand", default)]
    pub on_demand: HashMap<String, PriceTerm>,
    #[serde(rename = "Reserved", default)]
    pub reserved: HashMap<String, PriceTerm>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTerm {
    #[serde(default)]
    pub price_dimensions: HashMap<String, PriceDimension>,
    #[serde(default)]
    pub term_attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDimension {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub price_per_unit: HashMap<String, String>,
}

impl PriceListDocument {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn location(&self) -> &str {
        self.product
            .attributes
            .get("location")
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl PriceTerm {
    pub fn attribute(&self, name: &str) -> &str {
        self.term_attributes.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Yen per dollar used when a dimension carries only a `JPY` price.
pub const JPY_PER_USD: f64 = 150.0;

/// Currency a dimension's price was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Jpy,
}

impl PriceDimension {
    pub fn usd(&self) -> Option<&str> {
        self.price_per_unit.get("USD").map(String::as_str)
    }

    pub fn jpy(&self) -> Option<&str> {
        self.price_per_unit.get("JPY").map(String::as_str)
    }

    /// Raw price string in USD if present, otherwise in JPY.
    pub fn priced_amount(&self) -> Option<(&str, Currency)> {
        match (self.usd(), self.jpy()) {
            (Some(usd), _) => Some((usd, Currency::Usd)),
            (None, Some(jpy)) => Some((jpy, Currency::Jpy)),
            (None, None) => None,
        }
    }
}
