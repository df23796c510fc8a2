//! Configuration management for the verifier API
//!
//! Settings are layered with figment: hard-coded defaults, then an optional
//! `Config.toml`, then `EMAIL_VERIFIER_`-prefixed environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use verify_core::EngineConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineSettings,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Verification engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Path to the proxies file (`host:port[:user[:pass]]` per line).
    /// Without one, SMTP probes dial the exchangers directly.
    pub proxies: Option<PathBuf>,
    /// DNS query timeout in milliseconds
    pub dns_timeout_ms: u64,
    /// DNS retry attempts
    pub dns_attempts: usize,
    /// TCP/SOCKS5 connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Probe a random local-part to detect catch-all domains
    pub check_catch_all: bool,
    /// Addresses validated concurrently within one batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// Per-item retry budget in batch runs
    pub max_retries: u32,
    /// Base delay between per-item retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            proxies: None,
            dns_timeout_ms: defaults.dns_timeout_ms,
            dns_attempts: defaults.dns_attempts,
            connect_timeout_ms: defaults.connect_timeout_ms,
            check_catch_all: defaults.check_catch_all,
            batch_size: defaults.batch_size,
            batch_delay_ms: defaults.batch_delay_ms,
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay_ms,
        }
    }
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            dns_timeout_ms: self.dns_timeout_ms,
            dns_attempts: self.dns_attempts,
            connect_timeout_ms: self.connect_timeout_ms,
            check_catch_all: self.check_catch_all,
            batch_size: self.batch_size,
            batch_delay_ms: self.batch_delay_ms,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Allowed CORS origins; empty means any origin
    pub origins: Vec<String>,
    /// Maximum accepted bulk upload size in bytes
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit JSON-structured logs instead of the human-readable format
    pub json: bool,
    /// Default log level filter when RUST_LOG is unset
    pub level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

/// Environment variable names for the commonly tuned settings
#[allow(dead_code)]
pub mod env_vars {
    pub const SERVER_HOST: &str = "EMAIL_VERIFIER_SERVER_HOST";
    pub const SERVER_PORT: &str = "EMAIL_VERIFIER_SERVER_PORT";
    pub const ENGINE_PROXIES: &str = "EMAIL_VERIFIER_ENGINE_PROXIES";
    pub const HTTP_ORIGINS: &str = "EMAIL_VERIFIER_HTTP_ORIGINS";
    pub const OBSERVABILITY_JSON: &str = "EMAIL_VERIFIER_OBSERVABILITY_JSON";
    pub const OBSERVABILITY_LEVEL: &str = "EMAIL_VERIFIER_OBSERVABILITY_LEVEL";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_service_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.http.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.http.origins.is_empty());
        assert!(!config.observability.json);
    }

    #[test]
    fn engine_settings_round_trip_into_engine_config() {
        let settings = EngineSettings {
            batch_size: 7,
            check_catch_all: false,
            ..EngineSettings::default()
        };
        let engine = settings.to_engine_config();
        assert_eq!(engine.batch_size, 7);
        assert!(!engine.check_catch_all);
        assert_eq!(engine.dns_timeout_ms, 10_000);
        assert_eq!(engine.connect_timeout_ms, 10_000);
    }
}
