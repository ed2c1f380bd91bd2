//! Transactional email triggers.
//!
//! The mailer lives in a separate worker; this side only announces which
//! scenario to run for whom. Delivery is fire-and-forget: a failed publish
//! is logged and the request that caused it carries on.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;

pub const EMAIL_SUBJECT: &str = "notifications.email";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailNotification {
    pub scenario: String,
    pub to: String,
    pub data: Value,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: EmailNotification);
}

/// Publishes notifications on NATS for the mail worker.
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, notification: EmailNotification) {
        let payload = match serde_json::to_vec(&notification) {
            Ok(p) => p,
            Err(e) => {
                warn!(scenario = %notification.scenario, error = %e, "could not encode notification");
                return;
            }
        };
        if let Err(e) = self.client.publish(EMAIL_SUBJECT.to_string(), payload.into()).await {
            warn!(scenario = %notification.scenario, error = %e, "email trigger failed");
        }
    }
}

/// Used when no message bus is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: EmailNotification) {
        info!(scenario = %notification.scenario, to = %notification.to, "email trigger (no bus configured)");
    }
}

/// Sends one email per customer-facing event.
pub async fn announce(notifier: &dyn Notifier, to: &str, events: &[DomainEvent], data: &Value) {
    for scenario in events.iter().filter_map(DomainEvent::email_scenario) {
        notifier.notify(EmailNotification { scenario: scenario.to_string(), to: to.to_string(), data: data.clone() }).await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use crate::domain::events::{OrderEvent, ProductEvent};

    #[tokio::test]
    async fn test_announce_skips_internal_events() {
        let notifier = RecordingNotifier::default();
        let events = vec![
            DomainEvent::Product(ProductEvent::Published { product_id: "p".into() }),
            DomainEvent::Order(OrderEvent::Delivered { order_id: "o".into() }),
        ];
        announce(&notifier, "a@b.com", &events, &Value::Null).await;
        assert_eq!(notifier.scenarios(), vec!["order_delivered".to_string()]);
    }
}
