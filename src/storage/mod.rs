//! Document persistence
//!
//! The shop keeps every entity as a JSON document in a named collection.
//! Writes are plain upserts: the last writer wins and nothing spans more
//! than one document.

mod memory;
mod postgres;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

use crate::domain::aggregates::{Cart, Category, Coupon, Order, Product, ReturnRequest, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Permission denied: {hint}")]
    PermissionDenied { hint: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// A record that lives in a document collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
    fn doc_id(&self) -> &str;
}

impl Document for Product { const COLLECTION: &'static str = "products"; fn doc_id(&self) -> &str { self.id() } }
impl Document for Order { const COLLECTION: &'static str = "orders"; fn doc_id(&self) -> &str { self.id() } }
impl Document for Category { const COLLECTION: &'static str = "categories"; fn doc_id(&self) -> &str { &self.id } }
impl Document for Coupon { const COLLECTION: &'static str = "coupons"; fn doc_id(&self) -> &str { &self.id } }
impl Document for User { const COLLECTION: &'static str = "users"; fn doc_id(&self) -> &str { &self.id } }
impl Document for ReturnRequest { const COLLECTION: &'static str = "returns"; fn doc_id(&self) -> &str { self.id() } }
impl Document for Cart { const COLLECTION: &'static str = "carts"; fn doc_id(&self) -> &str { self.session_id() } }

/// Typed view over one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), _marker: PhantomData } }
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store, _marker: PhantomData } }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn require(&self, id: &str) -> Result<T, StoreError> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound { collection: T::COLLECTION, id: id.to_string() })
    }

    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.store
            .list(T::COLLECTION)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn find<F>(&self, predicate: F) -> Result<Option<T>, StoreError>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self.list().await?.into_iter().find(|d| predicate(d)))
    }

    pub async fn put(&self, doc: &T) -> Result<(), StoreError> {
        self.store.put(T::COLLECTION, doc.doc_id(), serde_json::to_value(doc)?).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> { self.store.delete(T::COLLECTION, id).await }
}

/// All collections the shop uses, sharing one backend.
#[derive(Clone)]
pub struct Collections {
    pub products: Collection<Product>,
    pub orders: Collection<Order>,
    pub categories: Collection<Category>,
    pub coupons: Collection<Coupon>,
    pub users: Collection<User>,
    pub returns: Collection<ReturnRequest>,
    pub carts: Collection<Cart>,
}

impl Collections {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            products: Collection::new(Arc::clone(&store)),
            orders: Collection::new(Arc::clone(&store)),
            categories: Collection::new(Arc::clone(&store)),
            coupons: Collection::new(Arc::clone(&store)),
            users: Collection::new(Arc::clone(&store)),
            returns: Collection::new(Arc::clone(&store)),
            carts: Collection::new(store),
        }
    }

    pub fn in_memory() -> Self { Self::new(Arc::new(MemoryDocumentStore::default())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Category;

    #[tokio::test]
    async fn test_collection_round_trip() {
        let c = Collections::in_memory();
        let mut cat = Category::create("Tül Perdeler", "tul-perdeler", None);
        c.categories.put(&cat).await.unwrap();
        cat.name = "Tüller".into();
        c.categories.put(&cat).await.unwrap();

        let all = c.categories.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Tüller");
        assert!(c.categories.find(|x| x.slug == "tul-perdeler").await.unwrap().is_some());
        assert!(matches!(c.categories.require("missing").await, Err(StoreError::NotFound { collection: "categories", .. })));
        assert!(c.categories.delete(&cat.id).await.unwrap());
        assert!(!c.categories.delete(&cat.id).await.unwrap());
    }
}
