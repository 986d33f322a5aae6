//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::metrics::Metrics;
use crate::store::{DocumentStore, PgDocumentStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Where product documents live.
    store: Arc<dyn DocumentStore>,

    /// Prometheus metrics registry.
    metrics: Arc<Metrics>,

    /// Bearer token for catalog mutations.
    admin_token: Option<String>,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations, and build the state.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&pool).await?;

        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(PgDocumentStore::new(pool, metrics.clone()));

        if config.admin_api_token.is_none() {
            tracing::warn!("ADMIN_API_TOKEN is not set; catalog mutations are disabled");
        }

        Ok(Self::from_parts(
            store,
            metrics,
            config.admin_api_token.clone(),
        ))
    }

    /// Assemble state around an existing store.
    pub fn from_parts(
        store: Arc<dyn DocumentStore>,
        metrics: Arc<Metrics>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                metrics,
                admin_token,
            }),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.inner.admin_token.as_deref()
    }
}
