//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkuError {
    #[error("SKU is required")]
    Empty,
    #[error("SKU must be at most 50 characters")]
    TooLong,
}

/// Display currency. Stored amounts are always in the base currency (LEI).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Lei,
    Ron,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Lei, Currency::Ron, Currency::Eur];

    /// Static exchange rate from one LEI.
    pub fn rate(self) -> Decimal {
        match self {
            Self::Lei => Decimal::ONE,
            Self::Ron => Decimal::new(25, 2),
            Self::Eur => Decimal::new(5, 2),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Lei => "LEI",
            Self::Ron => "RON",
            Self::Eur => "EUR",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lei => "LEI",
            Self::Ron => "RON",
            Self::Eur => "€",
        }
    }

    pub fn convert(self, amount: Decimal) -> Decimal { amount * self.rate() }

    /// Renders a base-currency amount in this currency with two decimals.
    pub fn format(self, amount: Decimal) -> String {
        let converted = self
            .convert(amount)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        match self {
            Self::Eur => format!("€{converted:.2}"),
            _ => format!("{converted:.2} {}", self.code()),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl FromStr for Currency {
    type Err = UnknownCurrency;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEI" | "MDL" => Ok(Self::Lei),
            "RON" => Ok(Self::Ron),
            "EUR" => Ok(Self::Eur),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

/// Interface language of a client session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    #[default]
    Ro,
    Ru,
}

impl Language {
    /// Two-letter code the payment gateway expects.
    pub fn gateway_code(self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::Ru => "ru",
        }
    }
}
