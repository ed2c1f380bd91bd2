//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Every price in the shop is quoted in Turkish lira.
pub const CURRENCY: &str = "TRY";

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        if value.contains('@') { return Err(SkuError::ReservedCharacter); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
    #[error("SKU must not contain '@'")]
    ReservedCharacter,
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn lira(amount: Decimal) -> Self { Self::new(amount, CURRENCY) }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn is_negative(&self) -> bool { self.amount.is_sign_negative() && !self.amount.is_zero() }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    /// Subtracts `other`, flooring the result at zero.
    pub fn sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new((self.amount - other.amount).max(Decimal::ZERO), &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Multiplies by an arbitrary factor and rounds to kuruş.
    pub fn scale(&self, factor: Decimal) -> Money { Money::new(self.amount * factor, &self.currency).rounded() }

    /// `percent` per cent of this amount, rounded to kuruş.
    pub fn percent(&self, percent: Decimal) -> Money { self.scale(percent / Decimal::ONE_HUNDRED) }

    pub fn min(&self, other: &Money) -> Money { if other.amount < self.amount { other.clone() } else { self.clone() } }

    pub fn rounded(&self) -> Money {
        Money::new(self.amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero), &self.currency)
    }

    /// Amount in minor units (kuruş), as payment gateways expect it.
    pub fn minor_units(&self) -> i64 {
        let minor = self.rounded().amount * Decimal::ONE_HUNDRED;
        i64::try_from(minor.trunc()).unwrap_or(i64::MAX)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() });
        }
        Ok(())
    }
}

impl Default for Money { fn default() -> Self { Self::zero(CURRENCY) } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rounded().amount, self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku() { let sku = Sku::new(" tul-001 ").unwrap(); assert_eq!(sku.as_str(), "TUL-001"); }

    #[test]
    fn test_sku_rejects_line_key_separator() { assert_eq!(Sku::new("A@B"), Err(SkuError::ReservedCharacter)); }

    #[test]
    fn test_money_add() {
        let a = Money::lira(Decimal::new(100, 0));
        let b = Money::lira(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_money_currency_mismatch() {
        let a = Money::lira(Decimal::ONE);
        let b = Money::new(Decimal::ONE, "EUR");
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn test_money_sub_floors_at_zero() {
        let a = Money::lira(Decimal::new(10, 0));
        let b = Money::lira(Decimal::new(25, 0));
        assert!(a.sub(&b).unwrap().is_zero());
    }

    #[test]
    fn test_percent_rounds_half_up() {
        // 12.5% of 0.99 = 0.12375
        let m = Money::lira(Decimal::new(99, 2)).percent(Decimal::new(125, 1));
        assert_eq!(m.amount(), Decimal::new(12, 2));
        assert_eq!(Money::lira(Decimal::new(1005, 3)).rounded().amount(), Decimal::new(101, 2));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::lira(Decimal::new(54990, 2)).minor_units(), 54990);
    }

    #[test]
    fn test_quantity_subtract() {
        let q = Quantity::new(3);
        assert_eq!(q.subtract(2), Some(Quantity::new(1)));
        assert_eq!(q.subtract(4), None);
    }
}
