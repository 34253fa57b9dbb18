use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved-instance / savings-plan commitment length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseLength {
    OneYear,
    ThreeYear,
}

impl LeaseLength {
    /// Value of the `LeaseContractLength` term attribute.
    pub fn api_value(&self) -> &'static str {
        match self {
            Self::OneYear => "1yr",
            Self::ThreeYear => "3yr",
        }
    }
}

impl FromStr for LeaseLength {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1yr" => Ok(Self::OneYear),
            "3yr" => Ok(Self::ThreeYear),
            other => Err(ConfigurationError::InvalidLeaseLength(other.to_string())),
        }
    }
}

impl fmt::Display for LeaseLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_value())
    }
}

/// Reserved-instance payment option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOption {
    NoUpfront,
    PartialUpfront,
    AllUpfront,
}

impl PaymentOption {
    /// Snake-case identifier used in cache keys and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoUpfront => "no_upfront",
            Self::PartialUpfront => "partial_upfront",
            Self::AllUpfront => "all_upfront",
        }
    }

    /// Value of the `PurchaseOption` term attribute.
    pub fn api_value(&self) -> &'static str {
        match self {
            Self::NoUpfront => "No Upfront",
            Self::PartialUpfront => "Partial Upfront",
            Self::AllUpfront => "All Upfront",
        }
    }
}

impl FromStr for PaymentOption {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_upfront" => Ok(Self::NoUpfront),
            "partial_upfront" => Ok(Self::PartialUpfront),
            "all_upfront" => Ok(Self::AllUpfront),
            other => Err(ConfigurationError::InvalidPaymentOption(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four price families. Each has its own cache discriminator so they never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PriceKind {
    OnDemand,
    Spot,
    Reserved {
        lease: LeaseLength,
        payment: PaymentOption,
    },
    SavingsPlan {
        lease: LeaseLength,
    },
}

impl PriceKind {
    /// Builds a reserved-instance kind from user-facing strings ("1yr", "no_upfront").
    pub fn reserved(lease: &str, payment: &str) -> Result<Self, ConfigurationError> {
        Ok(Self::Reserved {
            lease: lease.parse()?,
            payment: payment.parse()?,
        })
    }

    /// Builds a savings-plan kind from a user-facing lease string.
    pub fn savings_plan(lease: &str) -> Result<Self, ConfigurationError> {
        Ok(Self::SavingsPlan {
            lease: lease.parse()?,
        })
    }

    /// Discriminator stored in cache records (`price_type`).
    pub fn cache_discriminator(&self) -> String {
        match self {
            Self::OnDemand => "on_demand".to_string(),
            Self::Spot => "spot".to_string(),
            Self::Reserved { lease, payment } => format!("ri_{}_{}", lease, payment),
            Self::SavingsPlan { lease } => format!("savings_{}", lease),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OnDemand => "on-demand",
            Self::Spot => "spot",
            Self::Reserved { .. } => "reserved",
            Self::SavingsPlan { .. } => "savings-plan",
        }
    }
}

impl fmt::Display for PriceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_discriminator())
    }
}

impl FromStr for PriceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_demand" => return Ok(Self::OnDemand),
            "spot" => return Ok(Self::Spot),
            _ => {}
        }
        if let Some(lease) = s.strip_prefix("savings_") {
            return Self::savings_plan(lease);
        }
        if let Some(rest) = s.strip_prefix("ri_") {
            if let Some((lease, payment)) = rest.split_once('_') {
                return Self::reserved(lease, payment);
            }
        }
        Err(ConfigurationError::InvalidPriceKind(s.to_string()))
    }
}

impl From<PriceKind> for String {
    fn from(kind: PriceKind) -> Self {
        kind.cache_discriminator()
    }
}

impl TryFrom<String> for PriceKind {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
