use crate::pricing_client::SpotPriceObservation;
use crate::types::conversions::positive_price;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Spot price history for one instance type with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotPriceHistory {
    pub instance_type: String,
    pub region: String,
    pub days: u32,
    pub current_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub median_price: f64,
    /// Sample standard deviation, `None` with fewer than two points
    pub std_dev: Option<f64>,
    /// Oldest first
    pub price_points: Vec<(DateTime<Utc>, f64)>,
}

impl SpotPriceHistory {
    /// Builds the history from raw observations. Observations for other instance types and
    /// unparseable prices are ignored; `None` when nothing usable remains.
    pub fn from_observations(
        instance_type: &str,
        region: &str,
        days: u32,
        observations: &[SpotPriceObservation],
    ) -> Option<Self> {
        let mut price_points: Vec<(DateTime<Utc>, f64)> = observations
            .iter()
            .filter(|obs| obs.instance_type == instance_type)
            .filter_map(|obs| positive_price(&obs.price).map(|price| (obs.timestamp, price)))
            .collect();
        if price_points.is_empty() {
            return None;
        }
        price_points.sort_by_key(|(timestamp, _)| *timestamp);

        let prices: Vec<f64> = price_points.iter().map(|(_, price)| *price).collect();
        let n = prices.len() as f64;
        let avg_price = prices.iter().sum::<f64>() / n;
        let std_dev = (prices.len() > 1).then(|| {
            let variance = prices.iter().map(|p| (p - avg_price).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        });

        Some(Self {
            instance_type: instance_type.to_string(),
            region: region.to_string(),
            days,
            current_price: prices[prices.len() - 1],
            min_price: prices.iter().copied().fold(f64::INFINITY, f64::min),
            max_price: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg_price,
            median_price: median(&prices),
            std_dev,
            price_points,
        })
    }

    /// Standard deviation as a percentage of the mean.
    pub fn volatility_percentage(&self) -> Option<f64> {
        match self.std_dev {
            Some(std_dev) if std_dev > 0.0 && self.avg_price > 0.0 => Some(std_dev / self.avg_price * 100.0),
            _ => None,
        }
    }

    pub fn price_range(&self) -> f64 {
        self.max_price - self.min_price
    }

    /// Percent saved by buying at the window minimum instead of the current price.
    pub fn savings_vs_current(&self) -> Option<f64> {
        (self.current_price > 0.0).then(|| (self.current_price - self.min_price) / self.current_price * 100.0)
    }
}

fn median(prices: &[f64]) -> f64 {
    let mut sorted = prices.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
