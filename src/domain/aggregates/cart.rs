//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::coupon::Coupon;
use crate::domain::pricing::Dimensions;
use crate::domain::value_objects::{Money, MoneyError, Sku, CURRENCY};

pub const MAX_LINE_QUANTITY: u32 = 99;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    session_id: String,
    items: Vec<CartItem>,
    coupon_code: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub sku: Sku,
    pub name: String,
    pub dimensions: Option<Dimensions>,
    pub quantity: u32,
    pub unit_price: Money,
    pub image_url: Option<String>,
}

impl CartItem {
    /// Lines are keyed by SKU, plus the size for made-to-measure panels.
    pub fn key(&self) -> String {
        match self.dimensions {
            Some(d) => format!("{}@{d}", self.sku),
            None => self.sku.to_string(),
        }
    }

    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Flat-rate shipping that becomes free over a threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingPolicy {
    pub free_over: Money,
    pub flat_fee: Money,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self { free_over: Money::lira(Decimal::new(500, 0)), flat_fee: Money::lira(Decimal::new(4990, 2)) }
    }
}

impl ShippingPolicy {
    pub fn cost_for(&self, merchandise: &Money, has_items: bool) -> Money {
        if !has_items || merchandise.amount() >= self.free_over.amount() {
            Money::zero(merchandise.currency())
        } else {
            self.flat_fee.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub item_count: u32,
}

impl Cart {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), items: vec![], coupon_code: None, updated_at: Utc::now() }
    }

    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }

    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        let key = item.key();
        if let Some(existing) = self.items.iter_mut().find(|i| i.key() == key) {
            let quantity = existing.quantity.saturating_add(item.quantity);
            if quantity > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit(MAX_LINE_QUANTITY)); }
            existing.quantity = quantity;
            existing.unit_price = item.unit_price;
        } else {
            if item.quantity > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit(MAX_LINE_QUANTITY)); }
            self.items.push(item);
        }
        self.touch();
        Ok(())
    }

    /// Sets the quantity of the line with `key`; zero removes the line.
    pub fn update_quantity(&mut self, key: &str, quantity: u32) -> Result<(), CartError> {
        if quantity > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit(MAX_LINE_QUANTITY)); }
        let item = self.items.iter_mut().find(|i| i.key() == key).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.key() != key); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, key: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.key() != key);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn apply_coupon(&mut self, code: impl Into<String>) { self.coupon_code = Some(code.into()); self.touch(); }
    pub fn remove_coupon(&mut self) { self.coupon_code = None; self.touch(); }

    pub fn clear(&mut self) { self.items.clear(); self.coupon_code = None; self.touch(); }

    pub fn subtotal(&self) -> Result<Money, CartError> {
        let currency = self.items.first().map_or(CURRENCY, |i| i.unit_price.currency());
        self.items.iter().try_fold(Money::zero(currency), |acc, i| acc.add(&i.line_total()).map_err(CartError::from))
    }

    /// Cart arithmetic. `coupon` must already have been validated against
    /// the subtotal; shipping is judged on the discounted amount.
    pub fn totals(&self, policy: &ShippingPolicy, coupon: Option<&Coupon>) -> Result<CartTotals, CartError> {
        let subtotal = self.subtotal()?;
        let discount = coupon.map_or_else(|| Money::zero(subtotal.currency()), |c| c.discount_for(&subtotal));
        let merchandise = subtotal.sub(&discount)?;
        let shipping = policy.cost_for(&merchandise, !self.items.is_empty());
        let total = merchandise.add(&shipping)?.rounded();
        Ok(CartTotals { subtotal, discount, shipping, total, item_count: self.item_count() })
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found")]
    ItemNotFound,
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("At most {0} per line")]
    QuantityLimit(u32),
    #[error("Cart is empty")]
    Empty,
    #[error(transparent)]
    Money(#[from] MoneyError),
}
