//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::order::Address;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub wishlist: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] Customer, Admin }

impl User {
    /// Users are keyed by the id the hosted auth provider issued.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into(), display_name: None, role: Role::Customer, wishlist: vec![], addresses: vec![], created_at: Utc::now() }
    }

    /// Adds or removes `product_id`; returns whether it is now wished for.
    pub fn toggle_wishlist(&mut self, product_id: &str) -> bool {
        if let Some(pos) = self.wishlist.iter().position(|p| p == product_id) {
            self.wishlist.remove(pos);
            false
        } else {
            self.wishlist.push(product_id.to_string());
            true
        }
    }
}
