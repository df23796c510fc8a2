//! SOCKS5 proxy pool with rotation, cooldown and failure accounting
//!
//! The pool is the only globally mutable state in the engine. Every mutation
//! runs under one lock over the full pool snapshot, so concurrent callers
//! never observe a torn invariant. Proxies are handed out round-robin,
//! skipping entries that are cooling down, saturated with connections, or
//! past the failure threshold. When every entry has burned through its
//! failure budget the pool resets all counters once and retries, so a long
//! run can recover from a transient bad patch.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Failures after which a proxy is considered dead
pub const MAX_FAILURES: u32 = 3;
/// Concurrent connections allowed per proxy
pub const MAX_CONNECTIONS: u32 = 3;
/// Minimum gap between successive uses of the same proxy
pub const COOLDOWN: Duration = Duration::from_secs(30);

/// Pool limits; defaults are the production values.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_failures: u32,
    pub max_connections: u32,
    pub cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_failures: MAX_FAILURES,
            max_connections: MAX_CONNECTIONS,
            cooldown: COOLDOWN,
        }
    }
}

/// Address and credentials of one SOCKS5 proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyServer {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyServer {
    /// Parse a `host:port[:user[:pass]]` line. Returns `None` for anything
    /// that does not fit the format.
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split(':');
        let host = parts.next()?.trim();
        let port = parts.next()?.trim().parse::<u16>().ok()?;
        let username = parts.next().map(|s| s.trim().to_string());
        let password = parts.next().map(|s| s.trim().to_string());
        if host.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port,
            username: username.filter(|s| !s.is_empty()),
            password: password.filter(|s| !s.is_empty()),
        })
    }
}

impl std::fmt::Display for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
struct Slot {
    server: ProxyServer,
    failures: u32,
    active_connections: u32,
    last_used_at: Option<Instant>,
}

impl Slot {
    fn new(server: ProxyServer) -> Self {
        Self {
            server,
            failures: 0,
            active_connections: 0,
            last_used_at: None,
        }
    }

    fn eligible(&self, config: &PoolConfig) -> bool {
        self.failures < config.max_failures
            && self.active_connections < config.max_connections
            && self
                .last_used_at
                .map_or(true, |t| t.elapsed() >= config.cooldown)
    }
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Point-in-time pool counters, for logs and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub active_connections: u32,
    pub saturated: usize,
}

/// The shared pool of SOCKS5 proxies.
#[derive(Debug)]
pub struct ProxyPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl ProxyPool {
    /// A pool with no proxies; the dialer then connects directly.
    pub fn empty() -> Self {
        Self::from_servers(Vec::new(), PoolConfig::default())
    }

    pub fn from_servers(servers: Vec<ProxyServer>, config: PoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner {
                slots: servers.into_iter().map(Slot::new).collect(),
                cursor: 0,
            }),
        }
    }

    /// Load proxies from a text file, one `host:port[:user[:pass]]` per line.
    /// Blank lines and `#` comments are ignored; malformed lines are skipped
    /// with a warning.
    pub fn load(path: impl AsRef<Path>, config: PoolConfig) -> io::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let pool = Self::from_servers(parse_proxy_list(&content), config);
        info!(
            proxies = pool.len(),
            path = %path.as_ref().display(),
            "loaded proxy list"
        );
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            total: inner.slots.len(),
            available: inner
                .slots
                .iter()
                .filter(|s| s.eligible(&self.config))
                .count(),
            active_connections: inner.slots.iter().map(|s| s.active_connections).sum(),
            saturated: inner
                .slots
                .iter()
                .filter(|s| s.failures >= self.config.max_failures)
                .count(),
        }
    }

    /// Hand out the next eligible proxy, if any.
    ///
    /// Scans at most one full cycle from the rotation cursor. If nothing is
    /// eligible and every entry has exhausted its failure budget, all
    /// counters are reset once and the scan retried. Returns `None` when the
    /// pool has nothing to offer; callers decide whether to dial directly.
    pub fn acquire(self: &Arc<Self>) -> Option<ProxyLease> {
        let mut inner = self.lock();
        if inner.slots.is_empty() {
            return None;
        }

        if let Some(index) = Self::claim(&self.config, &mut inner) {
            return Some(self.lease(&inner, index));
        }

        if inner
            .slots
            .iter()
            .all(|s| s.failures >= self.config.max_failures)
        {
            warn!("every proxy exhausted its failure budget, resetting pool counters");
            for slot in &mut inner.slots {
                slot.failures = 0;
                slot.active_connections = 0;
                slot.last_used_at = None;
            }
            if let Some(index) = Self::claim(&self.config, &mut inner) {
                return Some(self.lease(&inner, index));
            }
        }

        None
    }

    fn claim(config: &PoolConfig, inner: &mut PoolInner) -> Option<usize> {
        let len = inner.slots.len();
        for offset in 0..len {
            let index = (inner.cursor + offset) % len;
            if inner.slots[index].eligible(config) {
                inner.cursor = (index + 1) % len;
                let slot = &mut inner.slots[index];
                slot.last_used_at = Some(Instant::now());
                slot.active_connections += 1;
                return Some(index);
            }
        }
        None
    }

    fn lease(self: &Arc<Self>, inner: &PoolInner, index: usize) -> ProxyLease {
        let server = inner.slots[index].server.clone();
        debug!(proxy = %server, "acquired proxy");
        ProxyLease {
            pool: Arc::clone(self),
            index,
            server,
            settled: false,
        }
    }

    fn release(&self, index: usize) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.active_connections = slot.active_connections.saturating_sub(1);
        }
    }

    fn mark_success(&self, index: usize) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.failures = 0;
        }
    }

    fn mark_failure(&self, index: usize) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.failures += 1;
            slot.active_connections = slot.active_connections.saturating_sub(1);
            debug!(proxy = %slot.server, failures = slot.failures, "marked proxy failure");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        // A poisoned lock only means another thread panicked mid-mutation of
        // plain counters; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_proxy_list(content: &str) -> Vec<ProxyServer> {
    let mut servers = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match ProxyServer::parse(line) {
            Some(server) => servers.push(server),
            None => warn!(line = number + 1, "skipping malformed proxy entry"),
        }
    }
    servers
}

/// An acquired proxy slot.
///
/// Exactly one of release or failure happens per lease: dropping the lease
/// releases the slot, [`ProxyLease::fail`] records a failure instead. This
/// keeps the connection accounting balanced on every exit path, including
/// cancellation.
#[derive(Debug)]
pub struct ProxyLease {
    pool: Arc<ProxyPool>,
    index: usize,
    server: ProxyServer,
    settled: bool,
}

impl ProxyLease {
    pub fn server(&self) -> &ProxyServer {
        &self.server
    }

    /// Clear the proxy's failure count after a clean dialog. The connection
    /// slot itself is returned when the lease drops.
    pub fn succeed(&self) {
        self.pool.mark_success(self.index);
    }

    /// Record a failure and give the connection slot back.
    pub fn fail(mut self) {
        self.settled = true;
        self.pool.mark_failure(self.index);
    }
}

impl Drop for ProxyLease {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.release(self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_config() -> PoolConfig {
        PoolConfig {
            max_failures: 3,
            max_connections: 3,
            cooldown: Duration::ZERO,
        }
    }

    fn pool_of(n: usize, config: PoolConfig) -> Arc<ProxyPool> {
        let servers = (0..n)
            .map(|i| ProxyServer {
                host: format!("proxy{i}.example.net"),
                port: 1080,
                username: None,
                password: None,
            })
            .collect();
        Arc::new(ProxyPool::from_servers(servers, config))
    }

    #[test]
    fn parse_accepts_all_supported_forms() {
        let parsed = ProxyServer::parse("10.0.0.1:1080").unwrap();
        assert_eq!(parsed.host, "10.0.0.1");
        assert_eq!(parsed.port, 1080);
        assert_eq!(parsed.username, None);

        let parsed = ProxyServer::parse("proxy.example.net:1080:alice:s3cret").unwrap();
        assert_eq!(parsed.username.as_deref(), Some("alice"));
        assert_eq!(parsed.password.as_deref(), Some("s3cret"));

        let parsed = ProxyServer::parse("proxy.example.net:1080:alice").unwrap();
        assert_eq!(parsed.username.as_deref(), Some("alice"));
        assert_eq!(parsed.password, None);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(ProxyServer::parse("no-port").is_none());
        assert!(ProxyServer::parse(":1080").is_none());
        assert!(ProxyServer::parse("host:not-a-port").is_none());
        assert!(ProxyServer::parse("h:1:u:p:extra").is_none());
    }

    #[test]
    fn load_skips_comments_blanks_and_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# fleet A").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.1:1080").unwrap();
        writeln!(file, "not a proxy").unwrap();
        writeln!(file, "10.0.0.2:1080:u:p").unwrap();

        let pool = ProxyPool::load(file.path(), PoolConfig::default()).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = Arc::new(ProxyPool::empty());
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn acquire_rotates_round_robin() {
        let pool = pool_of(3, test_config());
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_ne!(a.server(), b.server());
        assert_ne!(b.server(), c.server());
        assert_ne!(a.server(), c.server());
    }

    #[test]
    fn active_connection_accounting_balances() {
        let pool = pool_of(1, test_config());
        assert_eq!(pool.stats().active_connections, 0);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.stats().active_connections, 2);

        drop(a);
        assert_eq!(pool.stats().active_connections, 1);
        b.fail();
        assert_eq!(pool.stats().active_connections, 0);
    }

    #[test]
    fn connection_cap_is_enforced() {
        let pool = pool_of(1, test_config());
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        let _c = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn cooldown_blocks_immediate_reuse() {
        let config = PoolConfig {
            cooldown: Duration::from_secs(60),
            ..test_config()
        };
        let pool = pool_of(1, config);
        drop(pool.acquire().unwrap());
        // Released but still cooling down.
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn success_resets_failure_count() {
        let pool = pool_of(1, test_config());
        pool.acquire().unwrap().fail();
        pool.acquire().unwrap().fail();

        let lease = pool.acquire().unwrap();
        lease.succeed();
        drop(lease);

        assert_eq!(pool.stats().saturated, 0);
        // Three more failures are available again before saturation.
        pool.acquire().unwrap().fail();
        pool.acquire().unwrap().fail();
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn global_reset_revives_exhausted_pool() {
        let pool = pool_of(2, test_config());
        for _ in 0..2 {
            for _ in 0..3 {
                pool.acquire().unwrap().fail();
            }
        }
        assert_eq!(pool.stats().saturated, 2);

        // Next acquire triggers the global reset and succeeds.
        let lease = pool.acquire().expect("reset should revive the pool");
        assert_eq!(pool.stats().saturated, 0);
        drop(lease);
    }

    #[test]
    fn counters_never_go_negative() {
        let pool = pool_of(1, test_config());
        let lease = pool.acquire().unwrap();
        // Global reset zeroes active counts while the lease is outstanding;
        // the later drop must not underflow.
        for _ in 0..3 {
            pool.acquire().unwrap().fail();
        }
        let revived = pool.acquire().unwrap();
        drop(lease);
        drop(revived);
        assert_eq!(pool.stats().active_connections, 0);
    }
}
