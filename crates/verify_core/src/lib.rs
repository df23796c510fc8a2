//! # verify_core
//!
//! Email deliverability verification engine. Checks whether an address can
//! receive mail by probing the recipient's infrastructure step by step:
//! syntax, domain resolution, MX advertisement, SPF policy, and finally a
//! live SMTP conversation up to `RCPT TO`, without ever sending a message.
//!
//! ## Features
//!
//! - **Staged validation pipeline** with short-circuiting checks
//! - **SMTP mailbox probing** over SOCKS5-proxied connections with STARTTLS
//! - **Proxy pool** with rotation, cooldown and failure accounting
//! - **Catch-all detection** via a second randomized `RCPT TO` probe
//! - **Batch scheduling** with bounded parallelism and streamed progress
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verify_core::{EmailValidator, EngineConfig, ProxyPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = Arc::new(ProxyPool::empty());
//!     let validator = EmailValidator::new(EngineConfig::default(), pool)?;
//!
//!     let result = validator.validate("someone@example.com").await;
//!     println!("valid: {} ({})", result.valid, result.reason);
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod csv_io;
pub mod dns;
pub mod providers;
pub mod proxy;
pub mod smtp;
pub mod validation_pipeline;
pub mod verifier;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the verification engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// DNS resolver timeout in milliseconds
    pub dns_timeout_ms: u64,
    /// Maximum number of DNS lookup attempts
    pub dns_attempts: usize,
    /// TCP/SOCKS5 connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Probe a random local-part after a positive RCPT to detect catch-alls
    pub check_catch_all: bool,
    /// Addresses validated concurrently within one batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// Per-item retry budget for batch validation
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 10_000,
            dns_attempts: 2,
            connect_timeout_ms: 10_000,
            check_catch_all: true,
            batch_size: batch::BATCH_SIZE,
            batch_delay_ms: 2_000,
            max_retries: batch::MAX_RETRIES,
            retry_delay_ms: 2_000,
        }
    }
}

/// An email address split at its single `@`.
///
/// Holds the raw parts only; length limits and syntax are enforced by the
/// validation pipeline, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub local: String,
    pub domain: String,
}

impl Address {
    /// Split an address into local part and domain.
    ///
    /// Returns `None` unless the input is ASCII and contains exactly one `@`
    /// with non-empty parts on both sides.
    pub fn parse(email: &str) -> Option<Self> {
        if !email.is_ascii() {
            return None;
        }
        let mut parts = email.split('@');
        let local = parts.next()?;
        let domain = parts.next()?;
        if parts.next().is_some() || local.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }

    /// The full address in `local@domain` form.
    pub fn as_email(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

/// Outcome of the individual pipeline stages.
///
/// Every field defaults to `false`; a stage that never ran stays `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checks {
    pub format: bool,
    pub dns: bool,
    pub mx: bool,
    pub spf: bool,
    pub smtp: bool,
    pub mailbox: bool,
    pub catch_all: bool,
}

impl Checks {
    /// True when no stage produced a positive signal.
    pub fn all_false(&self) -> bool {
        *self == Self::default()
    }
}

/// Supporting evidence gathered along the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    /// MX exchanges in ascending priority order
    pub mx_records: Vec<String>,
    /// First `v=spf1` TXT record, if any
    pub spf_record: Option<String>,
    /// Final SMTP response line observed at RCPT, if the dialog got that far
    pub smtp_response: Option<String>,
}

/// Complete validation result for one address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// The address that was validated (normalized)
    pub email: String,
    /// Whether the address is considered deliverable
    pub valid: bool,
    /// Human-readable explanation of the outcome
    pub reason: String,
    /// Per-stage outcomes
    pub checks: Checks,
    /// Supporting evidence
    pub details: Details,
}

impl ValidationResult {
    /// A negative result with the given stage outcomes.
    pub fn rejected(email: impl Into<String>, reason: impl Into<String>, checks: Checks) -> Self {
        Self {
            email: email.into(),
            valid: false,
            reason: reason.into(),
            checks,
            details: Details::default(),
        }
    }

    /// Placeholder emitted when an item exhausts its batch retry budget.
    /// All checks stay false; the batch itself continues.
    pub fn batch_failure(email: impl Into<String>, error: impl Into<String>) -> Self {
        Self::rejected(email, error, Checks::default())
    }
}

/// Errors that can occur while building or driving the engine
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("DNS resolver initialization failed: {0}")]
    ResolverInit(String),
    #[error("failed to load proxy list: {0}")]
    ProxyList(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

// Re-export main types
pub use batch::{BatchScheduler, ProgressEvent};
pub use dns::{DnsResolver, MxRecord};
pub use providers::{ProviderProfile, ProviderRegistry};
pub use proxy::{PoolConfig, ProxyLease, ProxyPool, ProxyServer};
pub use validation_pipeline::EmailValidator;
pub use verifier::{MailboxVerdict, MailboxVerifier};
