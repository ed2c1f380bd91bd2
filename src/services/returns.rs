//! Return requests.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::aggregates::{OrderError, ReturnLine, ReturnRequest, ReturnStatus};
use crate::error::{AppError, AppResult};
use crate::services::notifications::{announce, Notifier};
use crate::storage::Collections;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReturnInput {
    pub order_id: String,
    #[validate(email)]
    pub email: String,
    pub lines: Vec<ReturnLine>,
    #[validate(length(min = 3, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution { Approve, Reject, Refund }

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveInput {
    pub action: Resolution,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct ReturnService {
    db: Collections,
    notifier: Arc<dyn Notifier>,
}

impl ReturnService {
    pub fn new(db: Collections, notifier: Arc<dyn Notifier>) -> Self { Self { db, notifier } }

    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn open(&self, input: ReturnInput) -> AppResult<ReturnRequest> {
        input.validate()?;
        let order = match self.db.orders.get(&input.order_id).await? {
            Some(order) if order.belongs_to(&input.email) => order,
            _ => return Err(OrderError::NotFound.into()),
        };
        let earlier: Vec<ReturnRequest> = self.db.returns.list().await?.into_iter().filter(|r| r.order_id() == order.id()).collect();
        if earlier.iter().any(|r| r.status() == ReturnStatus::Requested) {
            return Err(AppError::BadRequest("a return for this order is already pending".into()));
        }
        let request = ReturnRequest::open(&order, &earlier, input.lines, input.reason, Utc::now())?;
        self.persist(request, order.order_number()).await
    }

    pub async fn list(&self, status: Option<ReturnStatus>) -> AppResult<Vec<ReturnRequest>> {
        Ok(self.db.returns.list().await?.into_iter().filter(|r| status.map_or(true, |s| r.status() == s)).collect())
    }

    #[instrument(skip(self, input), fields(action = ?input.action))]
    pub async fn resolve(&self, id: &str, input: ResolveInput) -> AppResult<ReturnRequest> {
        let mut request = self.db.returns.require(id).await?;
        match input.action {
            Resolution::Approve => request.approve(input.note)?,
            Resolution::Reject => request.reject(input.note)?,
            Resolution::Refund => request.mark_refunded()?,
        }
        let order_number = self.db.orders.get(request.order_id()).await?.map(|o| o.order_number().to_string()).unwrap_or_default();
        self.persist(request, &order_number).await
    }

    async fn persist(&self, mut request: ReturnRequest, order_number: &str) -> AppResult<ReturnRequest> {
        let events = request.take_events();
        self.db.returns.put(&request).await?;
        info!(return_id = request.id(), status = ?request.status(), "return updated");
        let data = json!({ "returnId": request.id(), "orderNumber": order_number, "note": request.admin_note() });
        announce(self.notifier.as_ref(), request.email(), &events, &data).await;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderStatus, ReturnError};
    use crate::domain::value_objects::Sku;
    use crate::services::notifications::testing::RecordingNotifier;
    use crate::services::orders::tests::seed_order;

    fn lines(quantity: u32) -> Vec<ReturnLine> { vec![ReturnLine { sku: Sku::new("KT-1").unwrap(), quantity }] }

    fn input(order_id: &str, quantity: u32) -> ReturnInput {
        ReturnInput { order_id: order_id.into(), email: "ayse@example.com".into(), lines: lines(quantity), reason: "Renk farklı".into() }
    }

    #[tokio::test]
    async fn test_return_lifecycle() {
        let db = Collections::in_memory();
        let mut order = seed_order(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let service = ReturnService::new(db.clone(), notifier.clone());

        assert!(matches!(service.open(input(order.id(), 1)).await, Err(AppError::Return(ReturnError::NotDelivered))));

        order.advance_to(OrderStatus::Shipped, Some(("Aras".into(), "A1".into()))).unwrap();
        order.advance_to(OrderStatus::Delivered, None).unwrap();
        db.orders.put(&order).await.unwrap();

        assert!(matches!(service.open(input(order.id(), 3)).await, Err(AppError::Return(ReturnError::TooMany(_)))));
        let request = service.open(input(order.id(), 2)).await.unwrap();
        assert!(matches!(service.open(input(order.id(), 1)).await, Err(AppError::BadRequest(_))));

        let refund_early = service.resolve(request.id(), ResolveInput { action: Resolution::Refund, note: None }).await;
        assert!(matches!(refund_early, Err(AppError::Return(ReturnError::NotApproved))));
        service.resolve(request.id(), ResolveInput { action: Resolution::Approve, note: Some("Kargo bizden".into()) }).await.unwrap();
        let refunded = service.resolve(request.id(), ResolveInput { action: Resolution::Refund, note: None }).await.unwrap();
        assert_eq!(refunded.status(), ReturnStatus::Refunded);
        assert_eq!(refunded.admin_note(), Some("Kargo bizden"));

        assert_eq!(notifier.scenarios(), vec!["return_requested", "return_approved", "return_refunded"]);
        assert_eq!(service.list(Some(ReturnStatus::Refunded)).await.unwrap().len(), 1);

        // both units are already refunded
        assert!(matches!(service.open(input(order.id(), 2)).await, Err(AppError::Return(ReturnError::TooMany(_)))));
        assert!(matches!(service.open(input(order.id(), 1)).await, Err(AppError::Return(ReturnError::TooMany(_)))));
    }

    #[tokio::test]
    async fn test_wrong_email_hides_order() {
        let db = Collections::in_memory();
        let order = seed_order(&db).await;
        let service = ReturnService::new(db, Arc::new(RecordingNotifier::default()));
        let mut wrong = input(order.id(), 1);
        wrong.email = "someone@example.com".into();
        assert!(matches!(service.open(wrong).await, Err(AppError::Order(OrderError::NotFound))));
    }
}
