use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

// Prices arrive as decimal strings ("0.0104000000"); parse exactly, then narrow to f64
pub fn decimal_str_to_f64(value: &str) -> Result<f64, ConversionError> {
    let trimmed = value.trim();
    let decimal = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| ConversionError::InvalidDecimal(format!("{}: {}", trimmed, e)))?;
    decimal.to_f64().ok_or(ConversionError::Overflow)
}

/// Parses a price string and keeps it only if it is strictly positive.
pub fn positive_price(value: &str) -> Option<f64> {
    match decimal_str_to_f64(value) {
        Ok(price) if price > 0.0 && price.is_finite() => Some(price),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
}
