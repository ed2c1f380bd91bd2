//! Application state shared across handlers.

use std::sync::Arc;

use crate::domain::aggregates::ShippingPolicy;
use crate::services::{
    CatalogService, CheckoutService, MediaStore, Notifier, OrderService, PaymentGateway, ReturnService,
};
use crate::storage::Collections;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: CatalogService,
    checkout: CheckoutService,
    orders: OrderService,
    returns: ReturnService,
    admin_token: String,
    public_base_url: String,
}

/// External collaborators the services are wired to.
pub struct Backends {
    pub db: Collections,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub media: Arc<dyn MediaStore>,
    pub shipping: ShippingPolicy,
}

impl AppState {
    pub fn new(backends: Backends, admin_token: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        let Backends { db, notifier, payments, media, shipping } = backends;
        Self {
            inner: Arc::new(AppStateInner {
                catalog: CatalogService::new(db.clone(), media),
                checkout: CheckoutService::new(db.clone(), Arc::clone(&notifier), payments, shipping),
                orders: OrderService::new(db.clone(), Arc::clone(&notifier)),
                returns: ReturnService::new(db, notifier),
                admin_token: admin_token.into(),
                public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn catalog(&self) -> &CatalogService { &self.inner.catalog }
    pub fn checkout(&self) -> &CheckoutService { &self.inner.checkout }
    pub fn orders(&self) -> &OrderService { &self.inner.orders }
    pub fn returns(&self) -> &ReturnService { &self.inner.returns }
    pub fn admin_token(&self) -> &str { &self.inner.admin_token }
    pub fn public_base_url(&self) -> &str { &self.inner.public_base_url }
}
