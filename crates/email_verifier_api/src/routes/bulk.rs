//! Bulk CSV validation with streamed progress
//!
//! The upload is consumed fully into memory (bounded by the body limit),
//! parsed, and validated batch by batch while progress events stream back
//! as newline-delimited JSON. A client that disconnects mid-stream stops
//! the run at the next batch boundary.

use crate::{api_handler::ApiError, AppState};
use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use verify_core::{csv_io::CsvTable, ProgressEvent};

/// POST /validate/bulk
///
/// Multipart upload of one `.csv` file (≤ 10 MiB) whose header names an
/// address column. The response body is `application/x-ndjson`: zero or
/// more `{"type":"progress",...}` lines followed by one
/// `{"type":"complete",...}` line.
#[instrument(skip(state, multipart), fields(request_id))]
pub async fn validate_bulk_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", &request_id);

    let data = read_csv_field(&mut multipart, state.config.http.max_upload_bytes).await?;

    let table = CsvTable::parse(data.as_slice()).map_err(|e| ApiError::BadUpload(e.to_string()))?;
    let emails = table.emails();
    info!(rows = emails.len(), "starting bulk validation");

    let (events_tx, events_rx) = mpsc::channel::<ProgressEvent>(16);
    let validator = Arc::clone(&state.validator);
    tokio::spawn(async move {
        validator.validate_stream(emails, events_tx).await;
    });

    let body = Body::from_stream(ReceiverStream::new(events_rx).map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize progress event");
            r#"{"type":"error","error":"serialization failure"}"#.to_string()
        });
        line.push('\n');
        Ok::<_, Infallible>(line)
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Pull the first file field out of the multipart body, enforcing the
/// `.csv` extension and the size cap.
async fn read_csv_field(multipart: &mut Multipart, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(format!("malformed multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(ApiError::BadUpload(
                "only .csv uploads are accepted".to_string(),
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadUpload(format!("failed to read upload: {e}")))?;
        if data.len() > max_bytes {
            return Err(ApiError::BadUpload(format!(
                "upload exceeds the {} byte limit",
                max_bytes
            )));
        }
        return Ok(data.to_vec());
    }

    Err(ApiError::BadUpload("missing CSV file field".to_string()))
}
