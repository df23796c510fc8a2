//! Single-address and batch validation routes

use crate::{
    api_handler::{ApiError, BatchRequest, ValidateRequest},
    AppState,
};
use axum::{extract::State, response::Json};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use verify_core::ValidationResult;

/// POST /validate
///
/// Body: `{ "email": "user@example.com" }`. Runs the full staged pipeline
/// for one address and returns its `ValidationResult`. A missing or blank
/// `email` field is a 400.
#[instrument(skip(state, request), fields(request_id))]
pub async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", &request_id);

    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or(ApiError::MissingEmail)?
        .to_string();

    info!(%email, "validating address");
    let result = state.validator.validate(&email).await;
    info!(%email, valid = result.valid, reason = %result.reason, "validation finished");

    Ok(Json(result))
}

/// POST /validate/batch
///
/// Body: `{ "emails": [...] }`. Validates the whole list with the engine's
/// batch policy and returns results in input order. Individual failures
/// surface as per-item results, never as an HTTP error.
#[instrument(skip(state, request), fields(request_id, count))]
pub async fn validate_batch_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Json<Vec<ValidationResult>> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", &request_id);
    tracing::Span::current().record("count", request.emails.len());

    info!(count = request.emails.len(), "validating batch");
    let results = state.validator.validate_many(request.emails).await;

    Json(results)
}
