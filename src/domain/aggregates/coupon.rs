//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    code: String,
    pub kind: DiscountKind,
    pub min_spend: Money,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DiscountKind {
    Percent(Decimal),
    Fixed(Money),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon code is empty")]
    EmptyCode,
    #[error("Percent discount must be within (0, 100]")]
    InvalidPercent,
    #[error("Fixed discount must be positive")]
    InvalidAmount,
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon expired")]
    Expired,
    #[error("Minimum spend of {0} not met")]
    MinSpendNotMet(Money),
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
}

/// Codes are matched case-insensitively and without surrounding blanks.
pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

impl Coupon {
    pub fn create(code: &str, kind: DiscountKind, min_spend: Money, expires_at: Option<DateTime<Utc>>) -> Result<Self, CouponError> {
        let code = normalize_code(code);
        if code.is_empty() { return Err(CouponError::EmptyCode); }
        match &kind {
            DiscountKind::Percent(p) if *p <= Decimal::ZERO || *p > Decimal::ONE_HUNDRED => return Err(CouponError::InvalidPercent),
            DiscountKind::Fixed(m) if m.is_zero() || m.is_negative() => return Err(CouponError::InvalidAmount),
            _ => {}
        }
        Ok(Self {
            id: Uuid::now_v7().to_string(), code, kind, min_spend, expires_at,
            active: true, usage_limit: None, used_count: 0, created_at: Utc::now(),
        })
    }

    pub fn code(&self) -> &str { &self.code }

    pub fn matches(&self, code: &str) -> bool { self.code == normalize_code(code) }

    pub fn validate(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.active { return Err(CouponError::Inactive); }
        if self.expires_at.is_some_and(|at| at <= now) { return Err(CouponError::Expired); }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) { return Err(CouponError::UsageLimitReached); }
        if subtotal.amount() < self.min_spend.amount() { return Err(CouponError::MinSpendNotMet(self.min_spend.clone())); }
        Ok(())
    }

    /// Discount granted on `subtotal`; never larger than the subtotal itself.
    pub fn discount_for(&self, subtotal: &Money) -> Money {
        match &self.kind {
            DiscountKind::Percent(p) => subtotal.percent(*p).min(subtotal),
            DiscountKind::Fixed(amount) => amount.min(subtotal),
        }
    }

    pub fn redeem(&mut self) -> Result<(), CouponError> {
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) { return Err(CouponError::UsageLimitReached); }
        self.used_count += 1;
        Ok(())
    }

    /// Gives back a use taken by an order that never went through.
    pub fn release(&mut self) { self.used_count = self.used_count.saturating_sub(1); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lira(units: i64) -> Money { Money::lira(Decimal::new(units, 0)) }

    #[test]
    fn test_create_validates() {
        assert_eq!(Coupon::create("  ", DiscountKind::Percent(Decimal::TEN), lira(0), None).unwrap_err(), CouponError::EmptyCode);
        assert_eq!(Coupon::create("X", DiscountKind::Percent(Decimal::new(101, 0)), lira(0), None).unwrap_err(), CouponError::InvalidPercent);
        assert_eq!(Coupon::create("X", DiscountKind::Fixed(lira(0)), lira(0), None).unwrap_err(), CouponError::InvalidAmount);
        let c = Coupon::create(" yaz10 ", DiscountKind::Percent(Decimal::TEN), lira(0), None).unwrap();
        assert_eq!(c.code(), "YAZ10");
        assert!(c.matches("Yaz10"));
    }

    #[test]
    fn test_validate() {
        let now = Utc::now();
        let mut c = Coupon::create("PERDE50", DiscountKind::Fixed(lira(50)), lira(300), Some(now + Duration::days(1))).unwrap();
        assert_eq!(c.validate(&lira(299), now), Err(CouponError::MinSpendNotMet(lira(300))));
        assert!(c.validate(&lira(300), now).is_ok());
        assert_eq!(c.validate(&lira(300), now + Duration::days(2)), Err(CouponError::Expired));
        c.usage_limit = Some(1);
        c.redeem().unwrap();
        assert_eq!(c.validate(&lira(300), now), Err(CouponError::UsageLimitReached));
        c.active = false;
        assert_eq!(c.validate(&lira(300), now), Err(CouponError::Inactive));
    }

    #[test]
    fn test_discount_amounts() {
        let pct = Coupon::create("P", DiscountKind::Percent(Decimal::new(15, 0)), lira(0), None).unwrap();
        assert_eq!(pct.discount_for(&Money::lira(Decimal::new(19990, 2))).amount(), Decimal::new(2999, 2));
        let fixed = Coupon::create("F", DiscountKind::Fixed(lira(100)), lira(0), None).unwrap();
        assert_eq!(fixed.discount_for(&lira(60)).amount(), Decimal::new(60, 0));
        assert_eq!(fixed.discount_for(&lira(600)).amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_release_returns_a_use() {
        let now = Utc::now();
        let mut c = Coupon::create("TEK", DiscountKind::Fixed(lira(10)), lira(0), None).unwrap();
        c.usage_limit = Some(1);
        c.redeem().unwrap();
        assert_eq!(c.validate(&lira(100), now), Err(CouponError::UsageLimitReached));
        c.release();
        assert_eq!(c.used_count, 0);
        assert!(c.validate(&lira(100), now).is_ok());
        c.release();
        assert_eq!(c.used_count, 0);
    }
}
