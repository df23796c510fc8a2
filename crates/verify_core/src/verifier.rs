//! Mailbox verification across a domain's mail exchangers
//!
//! Walks the MX list in priority order and drives one SMTP dialog per
//! attempt, with a provider-specific retry schedule. A positive RCPT ends
//! the walk; so does a clear permanent reject, since lower-priority
//! exchangers share the same policy. Transport failures move on to the next
//! exchanger.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::dns::MxRecord;
use crate::providers::ProviderProfile;
use crate::proxy::ProxyPool;
use crate::smtp::{self, DialOptions, RcptProbe, SmtpDialog, SmtpError};
use crate::Address;

/// Base delay between probe retries
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Retry schedule for one mail exchanger.
///
/// Providers that greylist heavily (the Outlook family) get a longer budget
/// with exponential backoff; everyone else gets the profile's linear
/// schedule. Keeping this in one value isolates provider quirks from the
/// dialog itself.
#[derive(Debug, Clone, Copy)]
pub struct RetryStrategy {
    pub attempts: u32,
    exponential: bool,
    base_delay: Duration,
}

impl RetryStrategy {
    pub fn for_profile(profile: &ProviderProfile) -> Self {
        Self::with_base_delay(profile, RETRY_DELAY)
    }

    pub fn with_base_delay(profile: &ProviderProfile, base_delay: Duration) -> Self {
        if profile.custom_validation {
            Self {
                attempts: profile.retry_attempts.max(5),
                exponential: true,
                base_delay,
            }
        } else {
            Self {
                attempts: profile.retry_attempts.max(1),
                exponential: false,
                base_delay,
            }
        }
    }

    /// Pause before running `attempt`. Attempt 0 never waits.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        if self.exponential {
            self.base_delay * 2u32.saturating_pow(attempt)
        } else {
            self.base_delay * attempt
        }
    }
}

/// What the MX walk concluded for one address.
#[derive(Debug, Clone, Default)]
pub struct MailboxVerdict {
    /// At least one dialog reached the RCPT stage
    pub smtp_success: bool,
    /// The server's answer implies the mailbox exists
    pub mailbox_exists: bool,
    /// A random local-part was also accepted on the same server
    pub is_catch_all: bool,
    /// Final RCPT code, when a dialog completed
    pub code: Option<u16>,
    /// Final RCPT message or last transport error
    pub message: Option<String>,
}

/// How to proceed after a completed RCPT exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeDecision {
    /// Mailbox accepted; stop the walk
    Positive,
    /// Permanent reject; lower-priority exchangers share policy, stop
    Terminal,
    /// Indeterminate (transient 4xx); retry this exchanger
    Retry,
}

fn classify(profile: &ProviderProfile, rcpt: &RcptProbe) -> ProbeDecision {
    if rcpt.mailbox_exists {
        ProbeDecision::Positive
    } else if profile.reject_codes.contains(&rcpt.code) || (500..600).contains(&rcpt.code) {
        ProbeDecision::Terminal
    } else {
        ProbeDecision::Retry
    }
}

struct ProbeOutcome {
    rcpt: RcptProbe,
    /// Result of the random-local-part probe; `None` when not attempted or
    /// the second RCPT failed mid-flight
    catch_all: Option<bool>,
}

/// Drives SMTP probes for single addresses.
#[derive(Debug)]
pub struct MailboxVerifier {
    pool: Arc<ProxyPool>,
    connect_timeout: Duration,
    check_catch_all: bool,
    retry_delay: Duration,
}

impl MailboxVerifier {
    pub fn new(pool: Arc<ProxyPool>, connect_timeout: Duration, check_catch_all: bool) -> Self {
        Self {
            pool,
            connect_timeout,
            check_catch_all,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Probe the address against its exchangers, best first.
    pub async fn verify(
        &self,
        address: &Address,
        mx_records: &[MxRecord],
        profile: &ProviderProfile,
    ) -> MailboxVerdict {
        let strategy = RetryStrategy::with_base_delay(profile, self.retry_delay);
        let email = address.as_email();
        let mut verdict = MailboxVerdict::default();
        let mut last_error: Option<String> = None;

        'exchangers: for mx in mx_records {
            for attempt in 0..strategy.attempts {
                let pause = strategy.backoff(attempt);
                if !pause.is_zero() {
                    sleep(pause).await;
                }

                match self.probe(mx, address, &email, profile).await {
                    Ok(outcome) => {
                        verdict.smtp_success = true;
                        verdict.code = Some(outcome.rcpt.code);
                        verdict.message = Some(outcome.rcpt.message.clone());

                        match classify(profile, &outcome.rcpt) {
                            ProbeDecision::Positive => {
                                verdict.mailbox_exists = true;
                                verdict.is_catch_all = outcome.catch_all.unwrap_or(false);
                                return verdict;
                            }
                            ProbeDecision::Terminal => {
                                debug!(
                                    mx = %mx.exchange,
                                    code = outcome.rcpt.code,
                                    "mailbox rejected"
                                );
                                return verdict;
                            }
                            ProbeDecision::Retry => {
                                debug!(
                                    mx = %mx.exchange,
                                    code = outcome.rcpt.code,
                                    attempt,
                                    "indeterminate RCPT answer, retrying"
                                );
                            }
                        }
                    }
                    Err(SmtpError::ProxyExhausted) => {
                        warn!(attempt, "proxy pool exhausted, backing off");
                        last_error = Some(SmtpError::ProxyExhausted.to_string());
                    }
                    Err(e) => {
                        debug!(
                            mx = %mx.exchange,
                            error = %e,
                            transport = e.is_transport(),
                            "dialog failed, advancing to next exchanger"
                        );
                        last_error = Some(e.to_string());
                        continue 'exchangers;
                    }
                }
            }
        }

        if !verdict.smtp_success {
            verdict.message = last_error;
        }
        verdict
    }

    /// One full dialog against one exchanger, including proxy bookkeeping.
    async fn probe(
        &self,
        mx: &MxRecord,
        address: &Address,
        email: &str,
        profile: &ProviderProfile,
    ) -> Result<ProbeOutcome, SmtpError> {
        let lease = if self.pool.is_empty() {
            None
        } else {
            match self.pool.acquire() {
                Some(lease) => Some(lease),
                None => return Err(SmtpError::ProxyExhausted),
            }
        };

        let mail_from = smtp::synthesize_sender();
        let options = DialOptions {
            mx_host: &mx.exchange,
            proxy: lease.as_ref().map(|l| l.server()),
            helo_host: profile.helo_host.unwrap_or(&address.domain),
            mail_from: &mail_from,
            connect_timeout: self.connect_timeout,
        };

        let result = self.run_dialog(options, address, email, profile).await;

        match &result {
            Ok(_) => {
                if let Some(lease) = &lease {
                    lease.succeed();
                }
                // the lease drop returns the connection slot
            }
            Err(e) if e.is_transport() => {
                if let Some(lease) = lease {
                    lease.fail();
                }
            }
            // Protocol surprises are the server's doing; the proxy carried
            // the bytes fine and is only released.
            Err(_) => {}
        }

        result
    }

    async fn run_dialog(
        &self,
        options: DialOptions<'_>,
        address: &Address,
        email: &str,
        profile: &ProviderProfile,
    ) -> Result<ProbeOutcome, SmtpError> {
        let mut dialog = SmtpDialog::open(options, profile).await?;
        let rcpt = dialog.rcpt_to(email, profile).await?;

        let catch_all = if rcpt.mailbox_exists && self.check_catch_all {
            let probe_addr = format!("{}@{}", smtp::random_local_part(), address.domain);
            match dialog.rcpt_to(&probe_addr, profile).await {
                Ok(second) => Some(second.accepted),
                Err(e) => {
                    debug!(error = %e, "catch-all probe failed, leaving undetermined");
                    None
                }
            }
        } else {
            None
        };

        dialog.quit().await;
        Ok(ProbeOutcome { rcpt, catch_all })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderRegistry, GENERIC};

    fn probe(code: u16, exists: bool) -> RcptProbe {
        RcptProbe {
            mailbox_exists: exists,
            accepted: (200..300).contains(&code),
            code,
            message: String::new(),
        }
    }

    #[test]
    fn linear_strategy_for_regular_profiles() {
        let strategy = RetryStrategy::for_profile(&GENERIC);
        assert_eq!(strategy.attempts, 2);
        assert_eq!(strategy.backoff(0), Duration::ZERO);
        assert_eq!(strategy.backoff(1), Duration::from_secs(2));
        assert_eq!(strategy.backoff(2), Duration::from_secs(4));
        assert_eq!(strategy.backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn exponential_strategy_for_custom_validation_profiles() {
        let registry = ProviderRegistry::new();
        let outlook = registry.lookup("outlook.com", &[]);
        assert!(outlook.custom_validation);

        let strategy = RetryStrategy::for_profile(outlook);
        // The budget is extended to at least five attempts.
        assert_eq!(strategy.attempts, 5);
        assert_eq!(strategy.backoff(0), Duration::ZERO);
        assert_eq!(strategy.backoff(1), Duration::from_secs(4));
        assert_eq!(strategy.backoff(2), Duration::from_secs(8));
        assert_eq!(strategy.backoff(3), Duration::from_secs(16));
    }

    #[test]
    fn positive_rcpt_stops_the_walk() {
        assert_eq!(
            classify(&GENERIC, &probe(250, true)),
            ProbeDecision::Positive
        );
        // Greylist codes lean positive and also stop the walk.
        assert_eq!(
            classify(&GENERIC, &probe(451, true)),
            ProbeDecision::Positive
        );
    }

    #[test]
    fn permanent_reject_is_terminal() {
        assert_eq!(
            classify(&GENERIC, &probe(550, false)),
            ProbeDecision::Terminal
        );
        assert_eq!(
            classify(&GENERIC, &probe(554, false)),
            ProbeDecision::Terminal
        );
        // Unlisted 5xx still terminal: policy rejections repeat themselves.
        assert_eq!(
            classify(&GENERIC, &probe(521, false)),
            ProbeDecision::Terminal
        );
    }

    #[test]
    fn transient_answers_are_retried() {
        assert_eq!(classify(&GENERIC, &probe(450, false)), ProbeDecision::Retry);
        assert_eq!(classify(&GENERIC, &probe(430, false)), ProbeDecision::Retry);
    }

    #[tokio::test]
    async fn empty_mx_list_yields_no_smtp_success() {
        let pool = Arc::new(ProxyPool::empty());
        let verifier = MailboxVerifier::new(pool, Duration::from_secs(1), true);
        let address = Address::parse("user@example.com").unwrap();

        let verdict = verifier.verify(&address, &[], &GENERIC).await;
        assert!(!verdict.smtp_success);
        assert!(!verdict.mailbox_exists);
        assert!(verdict.code.is_none());
    }
}
