//! API routes
//!
//! - `validate`: single-address and batch validation
//! - `bulk`: multipart CSV upload with streamed NDJSON progress
//! - `health`: liveness check

pub mod bulk;
pub mod health;
pub mod validate;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build all API routes with the shared application state.
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/validate", post(validate::validate_handler))
        .route("/validate/batch", post(validate::validate_batch_handler))
        .route("/validate/bulk", post(bulk::validate_bulk_handler))
        .route("/health", get(health::health_handler))
        .with_state(state)
}
