//! Application services: load aggregates, run domain operations, persist,
//! and announce what happened.

pub mod catalog;
pub mod checkout;
pub mod media;
pub mod notifications;
pub mod orders;
pub mod payment;
pub mod returns;

pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use media::{LocalMediaStore, MediaStore};
pub use notifications::{LogNotifier, NatsNotifier, Notifier};
pub use orders::OrderService;
pub use payment::{IframeGateway, PaymentGateway};
pub use returns::ReturnService;
