//! Bounded-parallel batch scheduling with streamed progress
//!
//! Addresses are validated in small concurrent batches with a pause in
//! between; destination servers see a trickle, not a flood. The batch size
//! is deliberately small to stay under anti-abuse thresholds on the big
//! providers. One item failing its retry budget produces a placeholder
//! result and never aborts the rest of the run.

use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{EngineConfig, ValidationResult};

/// Addresses validated concurrently per batch
pub const BATCH_SIZE: usize = 5;
/// Pause between batches
pub const BATCH_DELAY: Duration = Duration::from_secs(2);
/// Per-item retry budget
pub const MAX_RETRIES: u32 = 3;
/// Base delay between per-item retries
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Events emitted while a bulk run is in flight. Serialized one per line
/// for NDJSON consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        /// Fraction of the input processed so far, monotone non-decreasing
        progress: f64,
        /// Results of the batch that just finished
        results: Vec<ValidationResult>,
    },
    Complete {
        /// Every result, in input order
        results: Vec<ValidationResult>,
    },
    Error {
        error: String,
    },
}

/// Runs a validation callback over many addresses with bounded parallelism.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            batch_delay: BATCH_DELAY,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl BatchScheduler {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Validate every address and return results in input order.
    pub async fn run<F, Fut>(&self, emails: Vec<String>, validate: F) -> Vec<ValidationResult>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<ValidationResult, String>>,
    {
        let mut results = Vec::with_capacity(emails.len());
        let mut first = true;
        for chunk in emails.chunks(self.batch_size) {
            if !first {
                sleep(self.batch_delay).await;
            }
            first = false;
            let batch = join_all(
                chunk
                    .iter()
                    .map(|email| self.item_with_retry(email.clone(), &validate)),
            )
            .await;
            results.extend(batch);
        }
        results
    }

    /// Like [`run`](Self::run), but emits a progress event after every batch
    /// and a completion event at the end. A dropped receiver stops the run
    /// at the next batch boundary; the partial results are still returned.
    pub async fn run_streaming<F, Fut>(
        &self,
        emails: Vec<String>,
        validate: F,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Vec<ValidationResult>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<ValidationResult, String>>,
    {
        let total = emails.len();
        let mut results: Vec<ValidationResult> = Vec::with_capacity(total);
        let mut first = true;

        for chunk in emails.chunks(self.batch_size) {
            if !first {
                sleep(self.batch_delay).await;
            }
            first = false;

            let batch: Vec<ValidationResult> = join_all(
                chunk
                    .iter()
                    .map(|email| self.item_with_retry(email.clone(), &validate)),
            )
            .await;
            results.extend(batch.iter().cloned());

            let progress = results.len() as f64 / total as f64;
            let event = ProgressEvent::Progress {
                progress,
                results: batch,
            };
            if events.send(event).await.is_err() {
                debug!(
                    processed = results.len(),
                    total, "consumer disconnected, stopping batch run"
                );
                return results;
            }
        }

        let _ = events
            .send(ProgressEvent::Complete {
                results: results.clone(),
            })
            .await;
        results
    }

    async fn item_with_retry<F, Fut>(&self, email: String, validate: &F) -> ValidationResult
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<ValidationResult, String>>,
    {
        let mut last_error = String::from("validation failed");
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                sleep(self.retry_delay * attempt).await;
            }
            match validate(email.clone()).await {
                Ok(result) => return result,
                Err(error) => {
                    warn!(%email, attempt, %error, "validation attempt failed");
                    last_error = error;
                }
            }
        }
        ValidationResult::batch_failure(email, last_error)
    }
}
