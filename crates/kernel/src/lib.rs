//! Storefront kernel library.
//!
//! Product catalog service built around a composable query shaper. The
//! `storefront` binary wires this library to PostgreSQL and serves it.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod shaper;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
