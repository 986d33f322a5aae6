//! HTTP middleware components.
//!
//! Provides the admin token gate and request metrics collection.

pub mod admin;
pub mod metrics;

pub use admin::require_admin;
pub use metrics::track_metrics;
