//! Monetary types for RateBridge.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A currency code that does not match `^[A-Z]{3}$`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code: {0:?}")]
pub struct InvalidCurrencyCode(pub String);

/// Reasons an amount is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAmount {
    #[error("Amount is not a number: {0:?}")]
    NotANumber(String),

    #[error("Amount must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("Amount has {scale} decimal places, at most {max} allowed")]
    TooManyDecimals { scale: u32, max: u32 },
}

/// A rate that violates `rate > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate for {currency} must be positive, got {rate}")]
pub struct NonPositiveRate {
    pub currency: CurrencyCode,
    pub rate: Decimal,
}

/// ISO 4217 currency code, always three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a code, rejecting anything outside `^[A-Z]{3}$`.
    ///
    /// No case folding happens here: `"usd"` is invalid input, not `USD`.
    pub fn parse(code: &str) -> Result<Self, InvalidCurrencyCode> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(InvalidCurrencyCode(code.to_string()))
        }
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = InvalidCurrencyCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InvalidCurrencyCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// A strictly positive amount to convert, with at most two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionAmount(Decimal);

impl ConversionAmount {
    /// Maximum number of significant decimal places accepted.
    pub const MAX_SCALE: u32 = 2;

    /// Validate a decimal amount.
    ///
    /// Trailing zeros do not count towards the scale, so `1.500` is accepted.
    pub fn new(value: Decimal) -> Result<Self, InvalidAmount> {
        if value <= Decimal::ZERO {
            return Err(InvalidAmount::NotPositive(value));
        }

        let scale = value.normalize().scale();
        if scale > Self::MAX_SCALE {
            return Err(InvalidAmount::TooManyDecimals {
                scale,
                max: Self::MAX_SCALE,
            });
        }

        Ok(Self(value))
    }

    /// Parse an amount from its textual form.
    ///
    /// Input that cannot be represented without rounding is rejected rather
    /// than silently truncated.
    pub fn parse(value: &str) -> Result<Self, InvalidAmount> {
        let text = value.trim();
        let parsed = Decimal::from_str_exact(text).map_err(|_| {
            if Decimal::from_str(text).is_ok() {
                InvalidAmount::TooManyDecimals {
                    scale: fraction_digits(text),
                    max: Self::MAX_SCALE,
                }
            } else {
                InvalidAmount::NotANumber(value.to_string())
            }
        })?;
        Self::new(parsed)
    }

    /// Get the amount value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for ConversionAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn fraction_digits(text: &str) -> u32 {
    text.split_once('.')
        .map(|(_, fraction)| u32::try_from(fraction.len()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// How much of `currency` one unit of the pivot currency buys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotRate {
    pub currency: CurrencyCode,
    pub rate: Decimal,
}

impl PivotRate {
    /// Create a pivot rate, enforcing `rate > 0`.
    pub fn new(currency: CurrencyCode, rate: Decimal) -> Result<Self, NonPositiveRate> {
        if rate <= Decimal::ZERO {
            return Err(NonPositiveRate { currency, rate });
        }
        Ok(Self { currency, rate })
    }
}

impl fmt::Display for PivotRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.currency, self.rate)
    }
}

/// The two pivot-relative rates needed to convert between a source and a
/// target currency, both quoted on `as_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePair {
    pub source_rate: PivotRate,
    pub target_rate: PivotRate,
    pub as_of: NaiveDate,
}

impl RatePair {
    pub fn new(source_rate: PivotRate, target_rate: PivotRate, as_of: NaiveDate) -> Self {
        Self {
            source_rate,
            target_rate,
            as_of,
        }
    }
}

/// Result of a conversion: an amount with exactly two decimal places and the
/// date the underlying rates were quoted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutcome {
    pub converted_amount: Decimal,
    #[serde(rename = "date")]
    pub as_of: NaiveDate,
}

impl ConversionOutcome {
    pub fn new(converted_amount: Decimal, as_of: NaiveDate) -> Self {
        Self {
            converted_amount,
            as_of,
        }
    }
}
