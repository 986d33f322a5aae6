//! PostgreSQL document store.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::sql::{DocumentQueryBuilder, PRODUCT_TABLE};
use super::{DocumentStore, StoreError};
use crate::db;
use crate::metrics::Metrics;
use crate::models::CategoryStats;
use crate::shaper::{QueryDescription, VERSION_KEY};

/// Document store backed by a `(id UUID, doc JSONB)` table, `product` by
/// default.
pub struct PgDocumentStore {
    pool: PgPool,
    metrics: Arc<Metrics>,
    table: String,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self::with_table(pool, metrics, PRODUCT_TABLE)
    }

    /// Use another table with the `product` layout.
    pub fn with_table(pool: PgPool, metrics: Arc<Metrics>, table: impl Into<String>) -> Self {
        Self {
            pool,
            metrics,
            table: table.into(),
        }
    }

    fn observe(&self, started: Instant) {
        self.metrics
            .record_store_query(started.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(&self, query: &QueryDescription) -> Result<Vec<Value>, StoreError> {
        let sql = DocumentQueryBuilder::new(&self.table, query).build();
        debug!(%sql, "executing document query");

        let started = Instant::now();
        let documents = sqlx::query_scalar::<_, Value>(&sql)
            .fetch_all(&self.pool)
            .await;
        self.observe(started);

        Ok(documents?)
    }

    async fn insert(&self, id: Uuid, document: Map<String, Value>) -> Result<Value, StoreError> {
        let table = &self.table;
        let started = Instant::now();
        let stored = sqlx::query_scalar::<_, Value>(&format!(
            "INSERT INTO \"{table}\" (id, doc) VALUES ($1, $2) \
             RETURNING (doc - '{VERSION_KEY}') || jsonb_build_object('id', id)"
        ))
        .bind(id)
        .bind(Value::Object(document))
        .fetch_one(&self.pool)
        .await;
        self.observe(started);

        Ok(stored?)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let table = &self.table;
        let started = Instant::now();
        let stored = sqlx::query_scalar::<_, Value>(&format!(
            "UPDATE \"{table}\" \
             SET doc = doc || $2 || jsonb_build_object('{VERSION_KEY}', \
                 COALESCE((doc ->> '{VERSION_KEY}')::bigint, 0) + 1) \
             WHERE id = $1 \
             RETURNING (doc - '{VERSION_KEY}') || jsonb_build_object('id', id)"
        ))
        .bind(id)
        .bind(Value::Object(changes))
        .fetch_optional(&self.pool)
        .await;
        self.observe(started);

        Ok(stored?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = &self.table;
        let started = Instant::now();
        let result = sqlx::query(&format!("DELETE FROM \"{table}\" WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await;
        self.observe(started);

        Ok(result?.rows_affected() > 0)
    }

    async fn category_stats(&self, min_rating: f64) -> Result<Vec<CategoryStats>, StoreError> {
        let table = &self.table;
        let started = Instant::now();
        let stats = sqlx::query_as::<_, CategoryStats>(&format!(
            r#"
            SELECT
                upper(doc ->> 'category') AS category,
                count(*) AS num_products,
                avg(rating) AS avg_rating,
                avg(price) AS avg_price,
                min(price) AS min_price,
                max(price) AS max_price
            FROM (
                SELECT
                    doc,
                    CASE WHEN jsonb_typeof(doc -> 'rating') = 'number'
                        THEN (doc ->> 'rating')::float8 END AS rating,
                    CASE WHEN jsonb_typeof(doc -> 'price') = 'number'
                        THEN (doc ->> 'price')::float8 END AS price
                FROM "{table}"
            ) AS rated
            WHERE rating >= $1
            GROUP BY upper(doc ->> 'category')
            ORDER BY avg_price ASC
            "#
        ))
        .bind(min_rating)
        .fetch_all(&self.pool)
        .await;
        self.observe(started);

        Ok(stats?)
    }

    async fn healthy(&self) -> bool {
        db::check_health(&self.pool).await
    }
}
