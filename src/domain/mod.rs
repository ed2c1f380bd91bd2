//! Storefront domain: aggregates, value objects and pure business rules.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod seo;
pub mod value_objects;
