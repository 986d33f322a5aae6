//! Admin token gate for catalog mutations.
//!
//! Checks `Authorization: Bearer <token>` against the configured admin
//! token. With no token configured every mutation is refused.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Middleware rejecting requests without the admin bearer token.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token() else {
        debug!("mutation refused: no admin token configured");
        return AppError::Unauthorized.into_response();
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token, expected));

    if !authorized {
        debug!(path = %request.uri().path(), "admin token missing or invalid");
        return AppError::Unauthorized.into_response();
    }

    next.run(request).await
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
