//! Staged validation pipeline
//!
//! Runs the checks in cost order and stops at the first failure: syntax and
//! length cost nothing, DNS costs one round-trip, and the SMTP probe costs a
//! full conversation with a mail exchanger. SPF is the exception; it is
//! recorded for the caller but never gates the outcome.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::batch::{BatchScheduler, ProgressEvent};
use crate::dns::DnsResolver;
use crate::providers::ProviderRegistry;
use crate::proxy::ProxyPool;
use crate::verifier::{MailboxVerdict, MailboxVerifier};
use crate::{Address, Checks, Details, EngineConfig, Result, ValidationResult};

pub const REASON_INVALID_FORMAT: &str = "Invalid email format";
pub const REASON_NO_DOMAIN: &str = "Domain does not exist";
pub const REASON_NO_MX: &str = "No mail servers found for domain";
pub const REASON_MAILBOX_FAILED: &str = "Failed to verify mailbox";
pub const REASON_NO_CONNECT: &str = "Could not connect to any mail server";
pub const REASON_CATCH_ALL: &str = "Catch-all domain detected";
pub const REASON_VALID: &str = "Email is valid";

// Local part: leading and trailing alphanumeric around up to 62 permitted
// characters (64 octets total). Domain: dotted labels bounded by
// alphanumerics, ending in a letter-only TLD of at least two characters.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9]([A-Za-z0-9._%+-]{0,62}[A-Za-z0-9])?@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("email pattern is valid")
});

/// The top-level validator: staged checks feeding the mailbox verifier.
#[derive(Debug)]
pub struct EmailValidator {
    config: EngineConfig,
    registry: ProviderRegistry,
    dns: DnsResolver,
    verifier: MailboxVerifier,
    pool: Arc<ProxyPool>,
}

impl EmailValidator {
    pub fn new(config: EngineConfig, pool: Arc<ProxyPool>) -> Result<Self> {
        let dns = DnsResolver::new(config.dns_timeout_ms, config.dns_attempts)?;
        let verifier = MailboxVerifier::new(
            Arc::clone(&pool),
            Duration::from_millis(config.connect_timeout_ms),
            config.check_catch_all,
        );

        Ok(Self {
            config,
            registry: ProviderRegistry::new(),
            dns,
            verifier,
            pool,
        })
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::from_config(&self.config)
    }

    /// Validate a single address through every stage.
    ///
    /// Never fails: stage failures become the returned result's `reason`
    /// and `checks`.
    #[instrument(skip(self))]
    pub async fn validate(&self, email: &str) -> ValidationResult {
        let email = email.trim().to_ascii_lowercase();
        let mut checks = Checks::default();
        let mut details = Details::default();

        // Stage 1: syntactic form
        if !EMAIL_RE.is_match(&email) {
            debug!(%email, "rejected by format check");
            return ValidationResult::rejected(email, REASON_INVALID_FORMAT, checks);
        }
        let Some(address) = Address::parse(&email) else {
            return ValidationResult::rejected(email, REASON_INVALID_FORMAT, checks);
        };

        // Stage 2: length limits (local <= 64 octets, domain <= 255)
        if address.local.len() > 64 || address.domain.len() > 255 {
            debug!(%email, "rejected by length check");
            return ValidationResult::rejected(email, REASON_INVALID_FORMAT, checks);
        }
        checks.format = true;

        // Stage 3: the domain must resolve
        if !self.dns.has_address(&address.domain).await {
            return ValidationResult::rejected(email, REASON_NO_DOMAIN, checks);
        }
        checks.dns = true;

        // Stage 4: someone must be advertised to accept mail
        let mx_records = self.dns.mx(&address.domain).await;
        if mx_records.is_empty() {
            return ValidationResult::rejected(email, REASON_NO_MX, checks);
        }
        checks.mx = true;
        details.mx_records = mx_records.iter().map(|r| r.exchange.clone()).collect();

        // Stage 5: SPF is evidence, never a gate
        details.spf_record = self.dns.spf(&address.domain).await;
        checks.spf = details.spf_record.is_some();

        // Stage 6: effective provider profile
        let profile = self.registry.lookup(&address.domain, &mx_records);
        debug!(provider = profile.name, "using provider profile");

        // Stage 7: live RCPT probe
        let verdict = self.verifier.verify(&address, &mx_records, profile).await;
        checks.smtp = verdict.smtp_success;
        checks.mailbox = verdict.mailbox_exists;
        checks.catch_all = verdict.is_catch_all;
        details.smtp_response = match (verdict.code, &verdict.message) {
            (Some(code), Some(message)) => Some(format!("{code} {message}")),
            (Some(code), None) => Some(code.to_string()),
            (None, message) => message.clone(),
        };

        let (valid, reason) = conclude(profile.reject_catch_all, &verdict);
        ValidationResult {
            email,
            valid,
            reason: reason.to_string(),
            checks,
            details,
        }
    }

    /// Validate many addresses with the configured batch policy; results
    /// come back in input order.
    pub async fn validate_many(self: &Arc<Self>, emails: Vec<String>) -> Vec<ValidationResult> {
        let validator = Arc::clone(self);
        self.scheduler()
            .run(emails, move |email| {
                let validator = Arc::clone(&validator);
                async move { Ok(validator.validate(&email).await) }
            })
            .await
    }

    /// Validate many addresses, emitting progress events after every batch.
    pub async fn validate_stream(
        self: &Arc<Self>,
        emails: Vec<String>,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Vec<ValidationResult> {
        let validator = Arc::clone(self);
        self.scheduler()
            .run_streaming(
                emails,
                move |email| {
                    let validator = Arc::clone(&validator);
                    async move { Ok(validator.validate(&email).await) }
                },
                events,
            )
            .await
    }
}

/// Fold the mailbox verdict and catch-all policy into the final outcome.
fn conclude(reject_catch_all: bool, verdict: &MailboxVerdict) -> (bool, &'static str) {
    if !verdict.smtp_success {
        return (false, REASON_NO_CONNECT);
    }
    if !verdict.mailbox_exists {
        return (false, REASON_MAILBOX_FAILED);
    }
    if verdict.is_catch_all && reject_catch_all {
        return (false, REASON_CATCH_ALL);
    }
    (true, REASON_VALID)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> EmailValidator {
        // Short DNS budget: the tests only exercise stages that fail before
        // or at resolution.
        let config = EngineConfig {
            dns_timeout_ms: 200,
            dns_attempts: 1,
            ..EngineConfig::default()
        };
        EmailValidator::new(config, Arc::new(ProxyPool::empty())).unwrap()
    }

    #[test]
    fn format_regex_accepts_common_addresses() {
        for email in [
            "user@example.com",
            "first.last@example.co.uk",
            "a@example.io",
            "tag+filter@sub.example.com",
            "user_name%ext@example-host.com",
        ] {
            assert!(EMAIL_RE.is_match(email), "should accept {email}");
        }
    }

    #[test]
    fn format_regex_rejects_malformed_addresses() {
        for email in [
            "not-an-email",
            "@example.com",
            "user@",
            "user@example",
            ".user@example.com",
            "user.@example.com",
            "user@-example.com",
            "user@example.c",
            "user@example.123",
            "us er@example.com",
        ] {
            assert!(!EMAIL_RE.is_match(email), "should reject {email}");
        }
    }

    #[test]
    fn local_part_boundary_is_sixty_four() {
        let local_64 = "a".repeat(64);
        let local_65 = "a".repeat(65);
        assert!(EMAIL_RE.is_match(&format!("{local_64}@example.com")));
        assert!(!EMAIL_RE.is_match(&format!("{local_65}@example.com")));
    }

    #[tokio::test]
    async fn domain_length_boundary_is_two_fifty_five() {
        let validator = validator();

        // Four 63-character labels joined by dots: 255 octets exactly.
        let label = "a".repeat(63);
        let domain_255 = [label.as_str(); 4].join(".");
        assert_eq!(domain_255.len(), 255);
        // One oversized label pushes it to 256.
        let domain_256 = format!("a{domain_255}");
        assert_eq!(domain_256.len(), 256);

        let result = validator.validate(&format!("user@{domain_256}")).await;
        assert!(!result.valid);
        assert_eq!(result.reason, REASON_INVALID_FORMAT);
        assert!(!result.checks.format);

        // The 255 case passes the length stage; it then fails on DNS, which
        // proves the boundary itself was accepted.
        let result = validator.validate(&format!("user@{domain_255}")).await;
        assert_ne!(result.reason, REASON_INVALID_FORMAT);
    }

    #[tokio::test]
    async fn malformed_address_short_circuits_with_all_checks_false() {
        let validator = validator();
        let result = validator.validate("not-an-email").await;

        assert!(!result.valid);
        assert_eq!(result.reason, REASON_INVALID_FORMAT);
        assert!(result.checks.all_false());
        assert!(result.details.mx_records.is_empty());
        assert!(result.details.smtp_response.is_none());
    }

    #[tokio::test]
    async fn input_is_trimmed_and_lowercased() {
        let validator = validator();
        let result = validator.validate("  Not-An-Email  ").await;
        assert_eq!(result.email, "not-an-email");
    }

    #[test]
    fn conclude_maps_verdicts_to_outcomes() {
        let verdict = |success, exists, catch_all| MailboxVerdict {
            smtp_success: success,
            mailbox_exists: exists,
            is_catch_all: catch_all,
            code: None,
            message: None,
        };

        // No exchanger could even be reached.
        assert_eq!(
            conclude(true, &verdict(false, false, false)),
            (false, REASON_NO_CONNECT)
        );
        // Every exchanger rejected the mailbox.
        assert_eq!(
            conclude(true, &verdict(true, false, false)),
            (false, REASON_MAILBOX_FAILED)
        );
        // Positive RCPT but the domain swallows anything.
        assert_eq!(
            conclude(true, &verdict(true, true, true)),
            (false, REASON_CATCH_ALL)
        );
        // Catch-all tolerated by the profile.
        assert_eq!(
            conclude(false, &verdict(true, true, true)),
            (true, REASON_VALID)
        );
        // The straightforward positive.
        assert_eq!(
            conclude(true, &verdict(true, true, false)),
            (true, REASON_VALID)
        );
    }
}
