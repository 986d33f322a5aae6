//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod product;

use axum::Router;

use crate::state::AppState;

/// Every route the service answers, with request metrics attached.
///
/// Transport layers (tracing, CORS) are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(product::router(&state))
        .merge(health::router())
        .merge(metrics::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::track_metrics,
        ))
        .with_state(state)
}
