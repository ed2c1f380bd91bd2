//! Return Request Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::events::{DomainEvent, ReturnEvent};
use crate::domain::value_objects::Sku;

/// Days after delivery during which a return can be opened.
pub const RETURN_WINDOW_DAYS: i64 = 14;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    id: String,
    order_id: String,
    email: String,
    lines: Vec<ReturnLine>,
    reason: String,
    status: ReturnStatus,
    admin_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnLine { pub sku: Sku, pub quantity: u32 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus { #[default] Requested, Approved, Rejected, Refunded }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    #[error("Order has not been delivered")]
    NotDelivered,
    #[error("Return window of {} days has closed", RETURN_WINDOW_DAYS)]
    WindowClosed,
    #[error("Nothing to return")]
    NoLines,
    #[error("{0} was not part of the order")]
    UnknownSku(Sku),
    #[error("Cannot return more of {0} than was ordered")]
    TooMany(Sku),
    #[error("Return request is already {0:?}")]
    AlreadyResolved(ReturnStatus),
    #[error("Only approved returns can be refunded")]
    NotApproved,
}

impl ReturnRequest {
    /// Opens a return against `order`. Units already claimed by `earlier`
    /// requests for the same order count against what can be returned,
    /// unless those requests were rejected.
    pub fn open(order: &Order, earlier: &[ReturnRequest], lines: Vec<ReturnLine>, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Self, ReturnError> {
        if order.status() != OrderStatus::Delivered { return Err(ReturnError::NotDelivered); }
        let delivered_at = order.delivered_at().ok_or(ReturnError::NotDelivered)?;
        if now - delivered_at > Duration::days(RETURN_WINDOW_DAYS) { return Err(ReturnError::WindowClosed); }
        if lines.is_empty() || lines.iter().any(|l| l.quantity == 0) { return Err(ReturnError::NoLines); }
        for line in &lines {
            let ordered: u32 = order.items().iter().filter(|i| i.sku == line.sku).map(|i| i.quantity).sum();
            if ordered == 0 { return Err(ReturnError::UnknownSku(line.sku.clone())); }
            let claimed: u32 = earlier
                .iter()
                .filter(|r| r.order_id == order.id() && r.status != ReturnStatus::Rejected)
                .flat_map(|r| &r.lines)
                .filter(|l| l.sku == line.sku)
                .map(|l| l.quantity)
                .sum();
            let requested: u32 = lines.iter().filter(|l| l.sku == line.sku).map(|l| l.quantity).sum();
            if claimed + requested > ordered { return Err(ReturnError::TooMany(line.sku.clone())); }
        }
        let id = Uuid::now_v7().to_string();
        let mut request = Self {
            id: id.clone(), order_id: order.id().to_string(), email: order.email().to_string(), lines,
            reason: reason.into(), status: ReturnStatus::Requested, admin_note: None,
            created_at: now, updated_at: now, events: vec![],
        };
        request.raise_event(DomainEvent::Return(ReturnEvent::Requested { return_id: id, order_id: order.id().to_string() }));
        Ok(request)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn order_id(&self) -> &str { &self.order_id }
    pub fn email(&self) -> &str { &self.email }
    pub fn lines(&self) -> &[ReturnLine] { &self.lines }
    pub fn status(&self) -> ReturnStatus { self.status }
    pub fn admin_note(&self) -> Option<&str> { self.admin_note.as_deref() }

    pub fn approve(&mut self, note: Option<String>) -> Result<(), ReturnError> {
        self.resolve(ReturnStatus::Approved, note)?;
        self.raise_event(DomainEvent::Return(ReturnEvent::Approved { return_id: self.id.clone() }));
        Ok(())
    }

    pub fn reject(&mut self, note: Option<String>) -> Result<(), ReturnError> {
        self.resolve(ReturnStatus::Rejected, note)?;
        self.raise_event(DomainEvent::Return(ReturnEvent::Rejected { return_id: self.id.clone() }));
        Ok(())
    }

    pub fn mark_refunded(&mut self) -> Result<(), ReturnError> {
        if self.status != ReturnStatus::Approved { return Err(ReturnError::NotApproved); }
        self.status = ReturnStatus::Refunded;
        self.touch();
        self.raise_event(DomainEvent::Return(ReturnEvent::Refunded { return_id: self.id.clone() }));
        Ok(())
    }

    fn resolve(&mut self, status: ReturnStatus, note: Option<String>) -> Result<(), ReturnError> {
        if self.status != ReturnStatus::Requested { return Err(ReturnError::AlreadyResolved(self.status)); }
        self.status = status;
        self.admin_note = note;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}
