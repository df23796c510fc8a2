//! Email Deliverability Verification API Server
//!
//! HTTP surface over the `verify_core` engine, built with axum and tokio.
//! Exposes single, batch and streaming bulk validation plus a health check.

use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verify_core::{EmailValidator, PoolConfig, ProxyPool};

mod api_handler;
mod config;
mod routes;

use config::AppConfig;

/// Shared application state
pub struct AppState {
    pub validator: Arc<EmailValidator>,
    pub config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    init_tracing(&config)?;

    info!(
        "Starting email verifier API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match &config.engine.proxies {
        Some(path) => ProxyPool::load(path, PoolConfig::default())?,
        None => ProxyPool::empty(),
    };
    if pool.is_empty() {
        info!("no proxies configured, SMTP probes will dial directly");
    } else {
        let stats = pool.stats();
        info!(
            total = stats.total,
            available = stats.available,
            "proxy pool ready"
        );
    }

    let validator = EmailValidator::new(config.engine.to_engine_config(), Arc::new(pool))
        .map_err(|e| format!("failed to initialize validation engine: {e}"))?;

    let state = AppState {
        validator: Arc::new(validator),
        config: Arc::new(config.clone()),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on {addr}");
    info!("Health check available at http://{addr}/health");
    info!("Validation API: http://{addr}/validate");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = if state.config.http.origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .http
            .origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers(Any)
    };

    // Slack on top of the upload cap covers the multipart framing overhead.
    let body_limit = state.config.http.max_upload_bytes + 64 * 1024;

    routes::build_routes(Arc::new(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Load application configuration from defaults, file and environment
fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if std::path::Path::new("Config.toml").exists() {
        figment = figment.merge(Toml::file("Config.toml"));
    }

    figment = figment.merge(Env::prefixed("EMAIL_VERIFIER_").split("_"));

    let config: AppConfig = figment.extract()?;
    Ok(config)
}

/// Initialize tracing and logging
fn init_tracing(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.level.clone().into());

    if config.observability.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
