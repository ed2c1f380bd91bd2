use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::{DocumentStore, StoreError};

/// Postgres SQLSTATE for insufficient_privilege.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Collections stored as JSONB rows of the `documents` table.
#[derive(Clone, Debug)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE) {
                return StoreError::PermissionDenied {
                    hint: "the database role lacks privileges on the documents table; grant SELECT, INSERT, UPDATE, DELETE to the application role".to_string(),
                };
            }
        }
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection).bind(id)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.0))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let rows: Vec<(Value,)> = sqlx::query_as("SELECT data FROM documents WHERE collection = $1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (collection, id, data, updated_at) VALUES ($1, $2, $3, NOW()) ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()")
            .bind(collection).bind(id).bind(doc)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection).bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
