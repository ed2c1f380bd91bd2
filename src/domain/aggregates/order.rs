//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::{CartItem, CartTotals};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::Dimensions;
use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    order_number: String,
    user_id: Option<String>,
    email: String,
    status: OrderStatus,
    payment: PaymentStatus,
    items: Vec<LineItem>,
    subtotal: Money,
    discount: Money,
    shipping: Money,
    total: Money,
    coupon_code: Option<String>,
    shipping_address: Address,
    tracking: Option<Tracking>,
    delivered_at: Option<DateTime<Utc>>,
    history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem { pub product_id: String, pub name: String, pub sku: Sku, pub dimensions: Option<Dimensions>, pub quantity: u32, pub unit_price: Money, pub total: Money }

impl From<&CartItem> for LineItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(), name: item.name.clone(), sku: item.sku.clone(),
            dimensions: item.dimensions, quantity: item.quantity, unit_price: item.unit_price.clone(), total: item.line_total(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address { pub full_name: String, pub phone: String, pub line1: String, pub line2: Option<String>, pub district: String, pub city: String, pub postal_code: Option<String>, pub country: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking { pub carrier: String, pub tracking_number: String, pub shipped_at: DateTime<Utc> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange { pub status: OrderStatus, pub at: DateTime<Utc> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "İşleniyor")]
    Processing,
    #[serde(rename = "Kargolandı")]
    Shipped,
    #[serde(rename = "Yolda")]
    InTransit,
    #[serde(rename = "Teslim Edildi")]
    Delivered,
    #[serde(rename = "İptal Edildi")]
    Cancelled,
}

impl OrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Processing => "İşleniyor",
            Self::Shipped => "Kargolandı",
            Self::InTransit => "Yolda",
            Self::Delivered => "Teslim Edildi",
            Self::Cancelled => "İptal Edildi",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    /// Captured after the order was cancelled; owed back to the customer.
    #[serde(rename = "refund_due")]
    RefundDue,
}

impl Order {
    pub fn place(
        email: impl Into<String>,
        user_id: Option<String>,
        shipping_address: Address,
        items: &[CartItem],
        totals: CartTotals,
        coupon_code: Option<String>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let order_number = format!("PRD-{}-{}", now.format("%y%m%d"), id.replace('-', "").chars().rev().take(6).collect::<String>().to_uppercase());
        let mut order = Self {
            id: id.clone(), order_number, user_id, email: email.into(),
            status: OrderStatus::Processing, payment: PaymentStatus::Pending,
            items: items.iter().map(LineItem::from).collect(),
            subtotal: totals.subtotal, discount: totals.discount, shipping: totals.shipping, total: totals.total.clone(),
            coupon_code, shipping_address, tracking: None, delivered_at: None,
            history: vec![StatusChange { status: OrderStatus::Processing, at: now }],
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, total: totals.total.amount() }));
        Ok(order)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Option<&str> { self.user_id.as_deref() }
    pub fn email(&self) -> &str { &self.email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment(&self) -> PaymentStatus { self.payment }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn total(&self) -> &Money { &self.total }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn tracking(&self) -> Option<&Tracking> { self.tracking.as_ref() }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn history(&self) -> &[StatusChange] { &self.history }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Tracking lookups require the address the order was placed with.
    pub fn belongs_to(&self, email: &str) -> bool { self.email.trim().eq_ignore_ascii_case(email.trim()) }

    /// A capture on a cancelled order is recorded as owed, not as paid.
    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        if self.payment != PaymentStatus::Pending { return Err(OrderError::PaymentAlreadySettled); }
        self.touch();
        if self.status == OrderStatus::Cancelled {
            self.payment = PaymentStatus::RefundDue;
            return Ok(());
        }
        self.payment = PaymentStatus::Paid;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id.clone() }));
        Ok(())
    }

    /// A declined payment voids the order. Returns whether this call did the
    /// voiding; an order cancelled earlier only has the decline recorded.
    pub fn mark_payment_failed(&mut self) -> Result<bool, OrderError> {
        if self.payment != PaymentStatus::Pending { return Err(OrderError::PaymentAlreadySettled); }
        self.payment = PaymentStatus::Failed;
        if self.status == OrderStatus::Cancelled {
            self.touch();
            return Ok(false);
        }
        self.set_status(OrderStatus::Cancelled);
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentFailed { order_id: self.id.clone() }));
        Ok(true)
    }

    pub fn ship(&mut self, carrier: impl Into<String>, tracking_number: impl Into<String>) -> Result<(), OrderError> {
        self.require(OrderStatus::Shipped, &[OrderStatus::Processing])?;
        let tracking = Tracking { carrier: carrier.into(), tracking_number: tracking_number.into(), shipped_at: Utc::now() };
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id.clone(), carrier: tracking.carrier.clone(), tracking: tracking.tracking_number.clone() }));
        self.tracking = Some(tracking);
        self.set_status(OrderStatus::Shipped);
        Ok(())
    }

    pub fn mark_in_transit(&mut self) -> Result<(), OrderError> {
        self.require(OrderStatus::InTransit, &[OrderStatus::Shipped])?;
        self.set_status(OrderStatus::InTransit);
        self.raise_event(DomainEvent::Order(OrderEvent::InTransit { order_id: self.id.clone() }));
        Ok(())
    }

    pub fn mark_delivered(&mut self) -> Result<(), OrderError> {
        self.require(OrderStatus::Delivered, &[OrderStatus::Shipped, OrderStatus::InTransit])?;
        self.delivered_at = Some(Utc::now());
        self.set_status(OrderStatus::Delivered);
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id.clone() }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.require(OrderStatus::Cancelled, &[OrderStatus::Processing])?;
        self.set_status(OrderStatus::Cancelled);
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id.clone() }));
        Ok(())
    }

    /// Admin entry point; statuses only move forward.
    pub fn advance_to(&mut self, status: OrderStatus, tracking: Option<(String, String)>) -> Result<(), OrderError> {
        match status {
            OrderStatus::Processing => Err(OrderError::InvalidTransition { from: self.status, to: status }),
            OrderStatus::Shipped => {
                let (carrier, number) = tracking.ok_or(OrderError::MissingTracking)?;
                self.ship(carrier, number)
            }
            OrderStatus::InTransit => self.mark_in_transit(),
            OrderStatus::Delivered => self.mark_delivered(),
            OrderStatus::Cancelled => self.cancel(),
        }
    }

    fn require(&self, to: OrderStatus, from: &[OrderStatus]) -> Result<(), OrderError> {
        if from.contains(&self.status) { Ok(()) } else { Err(OrderError::InvalidTransition { from: self.status, to }) }
    }

    fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.touch();
        self.history.push(StatusChange { status, at: self.updated_at });
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Cannot move order from {} to {}", from.label(), to.label())]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Carrier and tracking number are required to ship")]
    MissingTracking,
    #[error("Payment already settled")]
    PaymentAlreadySettled,
    #[error("Order not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn lira(units: i64) -> Money { Money::lira(Decimal::new(units, 0)) }

    fn order() -> Order {
        let item = CartItem { product_id: "P1".into(), sku: Sku::new("W001").unwrap(), name: "Tül".into(), dimensions: None, quantity: 2, unit_price: lira(10), image_url: None };
        let totals = CartTotals { subtotal: lira(20), discount: lira(0), shipping: Money::lira(Decimal::new(4990, 2)), total: Money::lira(Decimal::new(6990, 2)), item_count: 2 };
        Order::place("test@example.com", None, Address::default(), &[item], totals, None).unwrap()
    }

    #[test]
    fn test_order_workflow() {
        let mut order = order();
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.items()[0].total.amount(), Decimal::new(20, 0));
        order.mark_paid().unwrap();
        order.advance_to(OrderStatus::Shipped, Some(("Yurtiçi".into(), "YK123".into()))).unwrap();
        assert_eq!(order.tracking().unwrap().tracking_number, "YK123");
        order.mark_in_transit().unwrap();
        order.mark_delivered().unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.delivered_at().is_some());
        assert_eq!(order.history().len(), 4);
        let scenarios: Vec<_> = order.take_events().iter().filter_map(|e| e.email_scenario()).collect();
        assert_eq!(scenarios, vec!["order_created", "payment_received", "order_shipped", "order_in_transit", "order_delivered"]);
    }

    #[test]
    fn test_no_backwards_moves() {
        let mut order = order();
        assert_eq!(order.advance_to(OrderStatus::Shipped, None), Err(OrderError::MissingTracking));
        assert!(order.mark_delivered().is_err());
        order.ship("Aras", "A1").unwrap();
        assert_eq!(order.cancel(), Err(OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled }));
        assert!(order.advance_to(OrderStatus::Processing, None).is_err());
        // skipping the in-transit scan is allowed
        order.mark_delivered().unwrap();
    }

    #[test]
    fn test_empty_order_rejected() {
        let totals = CartTotals { subtotal: lira(0), discount: lira(0), shipping: lira(0), total: lira(0), item_count: 0 };
        assert_eq!(Order::place("a@b.c", None, Address::default(), &[], totals, None).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_failed_payment_cancels() {
        let mut order = order();
        assert_eq!(order.mark_payment_failed(), Ok(true));
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.mark_paid(), Err(OrderError::PaymentAlreadySettled));
    }

    #[test]
    fn test_late_payment_on_cancelled_order() {
        let mut declined = order();
        declined.cancel().unwrap();
        assert_eq!(declined.mark_payment_failed(), Ok(false));
        assert_eq!(declined.payment(), PaymentStatus::Failed);
        assert_eq!(declined.history().len(), 2);

        let mut captured = order();
        captured.cancel().unwrap();
        captured.mark_paid().unwrap();
        assert_eq!(captured.status(), OrderStatus::Cancelled);
        assert_eq!(captured.payment(), PaymentStatus::RefundDue);
        let scenarios: Vec<_> = captured.take_events().iter().filter_map(|e| e.email_scenario()).collect();
        assert_eq!(scenarios, vec!["order_created", "order_cancelled"]);
    }

    #[test]
    fn test_status_labels_on_the_wire() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"Teslim Edildi\"");
        let back: OrderStatus = serde_json::from_str("\"Kargolandı\"").unwrap();
        assert_eq!(back, OrderStatus::Shipped);
    }

    #[test]
    fn test_belongs_to() {
        let order = order();
        assert!(order.belongs_to(" TEST@example.com "));
        assert!(!order.belongs_to("other@example.com"));
    }
}
