//! Application error types.
//!
//! Every handler failure converges here and leaves as one envelope:
//! `{"status": "fail" | "error", "message": ...}`, `fail` for client errors
//! and `error` for server errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::models::ValidationError;
use crate::store::StoreError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("document store error")]
    Store(#[from] StoreError),
}

/// Failure envelope.
#[derive(Debug, Serialize)]
struct FailureBody {
    status: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side details stay in the log, not the response
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Store(e) if e.is_unavailable() => {
                tracing::error!(error = ?e, "document store unavailable");
                "service temporarily unavailable".to_string()
            }
            AppError::Store(e) => {
                tracing::error!(error = ?e, "document store error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = FailureBody {
            status: if status.is_client_error() {
                "fail"
            } else {
                "error"
            },
            message,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
