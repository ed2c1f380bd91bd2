//! Perde Storefront
//!
//! Backend of a curtain shop: catalog with made-to-measure pricing, session
//! carts, checkout through a hosted payment page, order tracking, returns
//! and the SEO plumbing (slugs, sitemap, legacy redirects).
//!
//! ## Layout
//! - `domain`: aggregates, value objects, pricing and events
//! - `storage`: JSON document collections over Postgres or memory
//! - `services`: use cases plus the payment, mail and media adapters
//! - `api`: axum routes

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::{AppState, Backends};
