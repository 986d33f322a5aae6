//! Document store seam.
//!
//! Route handlers build a [`QueryDescription`] and hand it to a
//! [`DocumentStore`] for its single execution. The PostgreSQL implementation
//! keeps each document in a JSONB column and renders descriptions to SQL
//! with [`DocumentQueryBuilder`].

mod postgres;
mod sql;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::CategoryStats;
use crate::shaper::{DEFAULT_PROJECTION, ID_FIELD, QueryDescription};

pub use postgres::PgDocumentStore;
pub use sql::{DocumentQueryBuilder, PRODUCT_TABLE, filter_condition};

/// Errors raised while executing against the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (pool exhausted or closed, I/O, TLS).
    #[error("document store unavailable")]
    Unavailable(#[source] sqlx::Error),

    #[error("document store query failed")]
    Query(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Unavailable(error),
            other => Self::Query(other),
        }
    }
}

impl StoreError {
    /// True for connectivity failures rather than query failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Executes query descriptions and document writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a shaped query.
    async fn find(&self, query: &QueryDescription) -> Result<Vec<Value>, StoreError>;

    /// Look up one document with the default projection.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Value>, StoreError> {
        let documents = self.find(&by_id(id)).await?;
        Ok(documents.into_iter().next())
    }

    /// Store a new document under `id`, returning it as a lookup would.
    async fn insert(&self, id: Uuid, document: Map<String, Value>) -> Result<Value, StoreError>;

    /// Merge `changes` into an existing document and bump its version key.
    ///
    /// Returns `None` when no document has that id.
    async fn update(
        &self,
        id: Uuid,
        changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError>;

    /// Remove a document. Returns false when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Per-category aggregates over documents rated at least `min_rating`.
    async fn category_stats(&self, min_rating: f64) -> Result<Vec<CategoryStats>, StoreError>;

    /// Whether the store currently answers.
    async fn healthy(&self) -> bool;
}

/// Single-document lookup query.
pub fn by_id(id: Uuid) -> QueryDescription {
    QueryDescription::find_by(ID_FIELD, id.to_string())
        .project(DEFAULT_PROJECTION)
        .limit_results(0, 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn by_id_query_shape() {
        let id = Uuid::nil();
        let query = by_id(id);

        assert_eq!(
            Value::Object(query.filter().clone()),
            json!({"id": "00000000-0000-0000-0000-000000000000"})
        );
        assert_eq!(query.projection_spec(), "-__v");
        assert_eq!(query.limit(), Some(1));
    }

    #[test]
    fn connectivity_errors_are_classified() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_unavailable());
    }
}
