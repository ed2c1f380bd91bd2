//! Order tracking and fulfilment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::domain::aggregates::{Address, LineItem, Order, OrderError, OrderStatus, PaymentStatus, Tracking};
use crate::domain::value_objects::Money;
use crate::error::{AppError, AppResult};
use crate::services::notifications::{announce, Notifier};
use crate::storage::Collections;

/// What a customer sees when tracking an order; no contact details beyond
/// the delivery city.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTracking {
    pub order_number: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub payment: PaymentStatus,
    pub items: Vec<LineItem>,
    pub total: Money,
    pub city: String,
    pub tracking: Option<Tracking>,
}

impl From<&Order> for OrderTracking {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number().to_string(),
            status: order.status(),
            status_label: order.status().label(),
            payment: order.payment(),
            items: order.items().to_vec(),
            total: order.total().clone(),
            city: order.shipping_address().city.clone(),
            tracking: order.tracking().cloned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Payload handed to the mail worker alongside the scenario name.
pub(crate) fn email_data(order: &Order) -> Value {
    let Address { full_name, city, .. } = order.shipping_address();
    json!({
        "orderId": order.id(),
        "orderNumber": order.order_number(),
        "name": full_name,
        "city": city,
        "status": order.status().label(),
        "total": order.total().to_string(),
        "items": order.items().iter().map(|i| json!({ "name": i.name, "quantity": i.quantity, "total": i.total.to_string() })).collect::<Vec<_>>(),
        "tracking": order.tracking(),
    })
}

/// Undoes what checkout reserved for `order`: stock for every ready-made
/// line and the coupon use. Products or coupons that have since
/// disappeared are skipped.
pub(crate) async fn release_order(db: &Collections, order: &Order) -> AppResult<()> {
    for item in order.items().iter().filter(|i| i.dimensions.is_none()) {
        let Some(mut product) = db.products.get(&item.product_id).await? else {
            warn!(product_id = %item.product_id, "cannot restock missing product");
            continue;
        };
        match product.restock(&item.sku, item.quantity) {
            Ok(()) => db.products.put(&product).await?,
            Err(e) => warn!(sku = %item.sku, error = %e, "cannot restock"),
        }
    }
    if let Some(code) = order.coupon_code() {
        match db.coupons.find(|c| c.matches(code)).await? {
            Some(mut coupon) => {
                coupon.release();
                db.coupons.put(&coupon).await?;
            }
            None => warn!(code, "cannot release missing coupon"),
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct OrderService {
    db: Collections,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(db: Collections, notifier: Arc<dyn Notifier>) -> Self { Self { db, notifier } }

    /// Public lookup; the email must match the one on the order.
    pub async fn track(&self, id: &str, email: &str) -> AppResult<OrderTracking> {
        match self.db.orders.get(id).await? {
            Some(order) if order.belongs_to(email) => Ok(OrderTracking::from(&order)),
            _ => Err(OrderError::NotFound.into()),
        }
    }

    pub async fn list(&self, status: Option<OrderStatus>) -> AppResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .db
            .orders
            .list()
            .await?
            .into_iter()
            .filter(|o| status.map_or(true, |s| o.status() == s))
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    pub async fn get(&self, id: &str) -> AppResult<Order> { Ok(self.db.orders.require(id).await?) }

    #[instrument(skip(self, update), fields(to = update.status.label()))]
    pub async fn update_status(&self, id: &str, update: StatusUpdate) -> AppResult<Order> {
        let mut order = self.db.orders.require(id).await?;
        let tracking = match (update.carrier, update.tracking_number) {
            (Some(carrier), Some(number)) if !carrier.trim().is_empty() && !number.trim().is_empty() => Some((carrier, number)),
            _ => None,
        };
        order.advance_to(update.status, tracking)?;
        self.persist(order).await
    }

    /// Customer cancellation; only possible before the parcel leaves.
    pub async fn cancel(&self, id: &str, email: &str) -> AppResult<Order> {
        let mut order = match self.db.orders.get(id).await? {
            Some(order) if order.belongs_to(email) => order,
            _ => return Err(AppError::from(OrderError::NotFound)),
        };
        order.cancel()?;
        self.persist(order).await
    }

    async fn persist(&self, mut order: Order) -> AppResult<Order> {
        if order.status() == OrderStatus::Cancelled {
            release_order(&self.db, &order).await?;
        }
        let events = order.take_events();
        self.db.orders.put(&order).await?;
        info!(order = order.order_number(), status = order.status().label(), "order updated");
        announce(self.notifier.as_ref(), order.email(), &events, &email_data(&order)).await;
        Ok(order)
    }
}
