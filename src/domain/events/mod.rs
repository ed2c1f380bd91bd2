//! Domain events
use crate::domain::value_objects::Sku;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Return(ReturnEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: String },
    Published { product_id: String },
    StockReserved { product_id: String, sku: Sku, quantity: u32 },
    OutOfStock { product_id: String, sku: Sku },
    DealApplied { product_id: String, price: Decimal },
    DealCleared { product_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, total: Decimal },
    Paid { order_id: String },
    PaymentFailed { order_id: String },
    Shipped { order_id: String, carrier: String, tracking: String },
    InTransit { order_id: String },
    Delivered { order_id: String },
    Cancelled { order_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnEvent {
    Requested { return_id: String, order_id: String },
    Approved { return_id: String },
    Rejected { return_id: String },
    Refunded { return_id: String },
}

impl DomainEvent {
    /// Email scenario the notification service should run for this event,
    /// if the customer is told about it at all.
    pub fn email_scenario(&self) -> Option<&'static str> {
        match self {
            DomainEvent::Order(e) => Some(match e {
                OrderEvent::Placed { .. } => "order_created",
                OrderEvent::Paid { .. } => "payment_received",
                OrderEvent::PaymentFailed { .. } => "payment_failed",
                OrderEvent::Shipped { .. } => "order_shipped",
                OrderEvent::InTransit { .. } => "order_in_transit",
                OrderEvent::Delivered { .. } => "order_delivered",
                OrderEvent::Cancelled { .. } => "order_cancelled",
            }),
            DomainEvent::Return(e) => Some(match e {
                ReturnEvent::Requested { .. } => "return_requested",
                ReturnEvent::Approved { .. } => "return_approved",
                ReturnEvent::Rejected { .. } => "return_rejected",
                ReturnEvent::Refunded { .. } => "return_refunded",
            }),
            DomainEvent::Product(_) => None,
        }
    }
}
