//! Provider profiles governing SMTP probe behavior per mail operator
//!
//! Large providers differ in how they answer RCPT probes: Gmail requires TLS
//! and answers quickly, Outlook greylists aggressively and needs a longer
//! budget, Yahoo sits in between. A profile bundles the timeouts, response
//! code sets and retry policy the verifier should use for a given domain.

use std::time::Duration;
use tracing::debug;

use crate::dns::MxRecord;

/// Probe policy for one mail operator.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Profile name, also reported in logs
    pub name: &'static str,
    /// Domains served exactly by this provider
    pub domains: &'static [&'static str],
    /// MX host suffixes that identify this provider for hosted domains
    pub mx_domains: &'static [&'static str],
    /// Per-response read deadline for the SMTP dialog
    pub timeout: Duration,
    /// Upgrade to STARTTLS when the server advertises it
    pub require_tls: bool,
    /// Report addresses on catch-all domains as invalid
    pub reject_catch_all: bool,
    /// RCPT codes treated as "mailbox accepted"
    pub accept_codes: &'static [u16],
    /// RCPT codes treated as "mailbox rejected"
    pub reject_codes: &'static [u16],
    /// Retry budget per mail exchanger
    pub retry_attempts: u32,
    /// Host name to present in EHLO; falls back to the recipient domain
    pub helo_host: Option<&'static str>,
    /// Provider needs the extended retry schedule (exponential backoff)
    pub custom_validation: bool,
}

const GENERIC_ACCEPT: &[u16] = &[250, 251, 252];
const GENERIC_REJECT: &[u16] = &[550, 551, 552, 553, 554];

/// The fallback profile applied when no provider matches.
pub const GENERIC: ProviderProfile = ProviderProfile {
    name: "generic",
    domains: &[],
    mx_domains: &[],
    timeout: Duration::from_millis(10_000),
    require_tls: false,
    reject_catch_all: true,
    accept_codes: GENERIC_ACCEPT,
    reject_codes: GENERIC_REJECT,
    retry_attempts: 2,
    helo_host: None,
    custom_validation: false,
};

const PROFILES: &[ProviderProfile] = &[
    ProviderProfile {
        name: "gmail",
        domains: &["gmail.com", "googlemail.com"],
        mx_domains: &["google.com", "googlemail.com"],
        timeout: Duration::from_millis(15_000),
        require_tls: true,
        reject_catch_all: true,
        accept_codes: &[250],
        reject_codes: GENERIC_REJECT,
        retry_attempts: 2,
        helo_host: None,
        custom_validation: false,
    },
    ProviderProfile {
        name: "outlook",
        domains: &["outlook.com", "hotmail.com", "live.com", "msn.com"],
        mx_domains: &["outlook.com", "hotmail.com", "protection.outlook.com"],
        timeout: Duration::from_millis(30_000),
        require_tls: false,
        reject_catch_all: true,
        accept_codes: GENERIC_ACCEPT,
        reject_codes: GENERIC_REJECT,
        retry_attempts: 3,
        helo_host: None,
        custom_validation: true,
    },
    ProviderProfile {
        name: "yahoo",
        domains: &["yahoo.com", "ymail.com", "rocketmail.com"],
        mx_domains: &["yahoodns.net", "yahoo.com"],
        timeout: Duration::from_millis(12_000),
        require_tls: true,
        reject_catch_all: true,
        accept_codes: GENERIC_ACCEPT,
        reject_codes: GENERIC_REJECT,
        retry_attempts: 2,
        helo_host: None,
        custom_validation: false,
    },
];

/// Maps a recipient domain (and its MX hosts) to a [`ProviderProfile`].
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the effective profile for a domain.
    ///
    /// Tries an exact match on the lowercased domain first, then matches the
    /// domain's MX exchanges against each profile's `mx_domains` so hosted
    /// tenants (e.g. Google Workspace domains) pick up their operator's
    /// policy. MX matching is a suffix match on a DNS-label boundary; a host
    /// like `notgoogle.com` never matches `google.com`.
    pub fn lookup(&self, domain: &str, mx_records: &[MxRecord]) -> &'static ProviderProfile {
        let domain = domain.to_ascii_lowercase();

        for profile in PROFILES {
            if profile.domains.iter().any(|d| *d == domain) {
                debug!(provider = profile.name, %domain, "matched provider by domain");
                return profile;
            }
        }

        for profile in PROFILES {
            for mx in mx_records {
                let exchange = mx.exchange.to_ascii_lowercase();
                if profile
                    .mx_domains
                    .iter()
                    .any(|suffix| is_label_suffix(&exchange, suffix))
                {
                    debug!(
                        provider = profile.name,
                        %domain,
                        exchange = %mx.exchange,
                        "matched provider by MX host"
                    );
                    return profile;
                }
            }
        }

        &GENERIC
    }
}

/// True when `host` equals `suffix` or ends with `.suffix`.
fn is_label_suffix(host: &str, suffix: &str) -> bool {
    host == suffix
        || (host.len() > suffix.len()
            && host.ends_with(suffix)
            && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
}
