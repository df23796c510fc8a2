//! Shared API types and error mapping
//!
//! Engine-level outcomes travel inside [`verify_core::ValidationResult`];
//! this module only covers what can go wrong at the HTTP boundary itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;

/// Body for `POST /validate`
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Body for `POST /validate/batch`
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Errors raised at the HTTP boundary
#[derive(Debug)]
pub enum ApiError {
    /// `email` field missing or blank
    MissingEmail,
    /// Bulk upload rejected before validation started
    BadUpload(String),
    /// Unexpected internal failure
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingEmail => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "valid": false,
                    "reason": "Missing required field: email",
                })),
            )
                .into_response(),
            ApiError::BadUpload(error) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "type": "error", "error": error })),
            )
                .into_response(),
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": error,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })),
            )
                .into_response(),
        }
    }
}
