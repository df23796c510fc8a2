//! DNS lookups backed by hickory-resolver
//!
//! Thin facade over the async resolver. Lookup failures are part of the
//! contract, not errors: a domain that does not resolve maps to `false` /
//! empty / `None` so the pipeline can turn it into a result.

use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    proto::rr::RecordType,
    AsyncResolver, TokioAsyncResolver,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::Result;

/// One mail exchanger advertised for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecord {
    pub exchange: String,
    pub priority: u16,
}

/// Async DNS resolver with engine-appropriate timeouts
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Create a resolver using Cloudflare upstreams.
    ///
    /// # Arguments
    /// * `timeout_ms` - per-query timeout in milliseconds
    /// * `attempts` - maximum retry attempts per query
    pub fn new(timeout_ms: u64, attempts: usize) -> Result<Self> {
        let config = ResolverConfig::cloudflare();

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_millis(timeout_ms);
        opts.attempts = attempts;
        opts.negative_min_ttl = Some(Duration::from_secs(30));

        let resolver = AsyncResolver::tokio(config, opts);

        debug!(timeout_ms, attempts, "DNS resolver initialized");

        Ok(Self { resolver })
    }

    /// Whether the domain resolves at all: any A, AAAA or CNAME record
    /// counts. The three lookups run in parallel and any success wins.
    pub async fn has_address(&self, domain: &str) -> bool {
        let (a, aaaa, cname) = tokio::join!(
            self.resolver.ipv4_lookup(domain),
            self.resolver.ipv6_lookup(domain),
            self.resolver.lookup(domain, RecordType::CNAME),
        );

        let found = a.map(|r| r.iter().count() > 0).unwrap_or(false)
            || aaaa.map(|r| r.iter().count() > 0).unwrap_or(false)
            || cname.map(|r| r.iter().count() > 0).unwrap_or(false);

        debug!(%domain, found, "address lookup");
        found
    }

    /// MX records for a domain, sorted by ascending priority. Lookup
    /// failures and NXDOMAIN both yield an empty list. The sort is stable,
    /// so exchanges sharing a priority keep their advertised order.
    pub async fn mx(&self, domain: &str) -> Vec<MxRecord> {
        let mut records: Vec<MxRecord> = match self.resolver.mx_lookup(domain).await {
            Ok(response) => response
                .iter()
                .map(|mx| MxRecord {
                    exchange: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                    priority: mx.preference(),
                })
                .collect(),
            Err(e) => {
                debug!(%domain, error = %e, "MX lookup failed");
                Vec::new()
            }
        };

        records.sort_by_key(|r| r.priority);
        debug!(%domain, count = records.len(), "MX lookup");
        records
    }

    /// The domain's SPF policy: the first TXT record starting with `v=spf1`.
    pub async fn spf(&self, domain: &str) -> Option<String> {
        let response = match self.resolver.txt_lookup(domain).await {
            Ok(response) => response,
            Err(e) => {
                debug!(%domain, error = %e, "TXT lookup failed");
                return None;
            }
        };

        for txt in response.iter() {
            let record: String = txt
                .txt_data()
                .iter()
                .map(|data| String::from_utf8_lossy(data))
                .collect();
            if record.trim_start().to_lowercase().starts_with("v=spf1") {
                debug!(%domain, "found SPF record");
                return Some(record);
            }
        }

        None
    }
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolver_construction_succeeds() {
        assert!(DnsResolver::new(1_000, 2).is_ok());
    }

    #[test]
    fn mx_records_sort_stably_by_priority() {
        let mut records = vec![
            MxRecord {
                exchange: "mx-c.example.com".into(),
                priority: 20,
            },
            MxRecord {
                exchange: "mx-a.example.com".into(),
                priority: 10,
            },
            MxRecord {
                exchange: "mx-b.example.com".into(),
                priority: 10,
            },
        ];
        records.sort_by_key(|r| r.priority);

        let order: Vec<&str> = records.iter().map(|r| r.exchange.as_str()).collect();
        // Equal priorities keep their original relative order.
        assert_eq!(
            order,
            ["mx-a.example.com", "mx-b.example.com", "mx-c.example.com"]
        );
    }
}
