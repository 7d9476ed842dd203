//! Goliath OpenID Connect provider
//!
//! Single-binary service that:
//! 1. Loads the client registration and signing key from TOML
//! 2. Serves `/authorize` (302 with state and code) and `/token` (JSON token triple)
//! 3. Evicts unredeemed codes in the background
//! 4. Exposes `/ping`, `/health` and `/metrics` for operators

mod config;
mod error;
mod metrics;

use anyhow::{Context, Result};
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use goliath_iam::{
    AuthorizationFlow, AuthorizeRequest, SessionStore, TokenExchange, TokenRequest, spawn_reaper,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::{ApiError, bad_request};

/// How long in-flight requests may take to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const PING_MESSAGE: &str = "Pong from goliath\n";

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    flow: Arc<AuthorizationFlow>,
    exchange: Arc<TokenExchange>,
    store: Arc<SessionStore>,
    /// Fixed issuer; `None` derives it from each token request
    issuer: Option<String>,
    pkce: bool,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl AppState {
    fn new(config: &Config, store: Arc<SessionStore>, prometheus: PrometheusHandle) -> Self {
        Self {
            flow: Arc::new(AuthorizationFlow::new(store.clone(), config.client_policy())),
            exchange: Arc::new(TokenExchange::new(store.clone(), config.token_policy())),
            store,
            issuer: config.server.issuer.clone(),
            pkce: config.app.pkce,
            started_at: Instant::now(),
            prometheus,
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit bounds in-flight requests to `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/token", post(token_handler))
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Command line flags
#[derive(Debug, Parser)]
#[command(name = "goliath")]
#[command(about = "OpenID Connect authorization code provider")]
#[command(version)]
struct Cli {
    /// Config file (default: $CONFIG_PATH or goliath.toml)
    #[arg(long)]
    config: Option<String>,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,

    /// Require PKCE (S256) for every authorization request
    #[arg(long)]
    pkce: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting goliath");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.pkce {
        config.app.pkce = true;
    }

    info!(
        listen_addr = %config.listen_addr(),
        client_id = config.app.client_id,
        redirect_uris = config.app.allowed_redirect_uris.len(),
        pkce = config.app.pkce,
        issuer = config.server.issuer.as_deref().unwrap_or("<per request>"),
        code_ttl_secs = config.session.code_ttl_secs,
        "configuration loaded"
    );

    let store = Arc::new(SessionStore::new(config.code_ttl()));
    let reaper = spawn_reaper(store.clone(), config.reap_interval());

    let app = build_router(
        AppState::new(&config, store, prometheus_handle),
        config.server.max_connections,
    );

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the signal fires, not when the server starts
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());
    reaper.abort();

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// `GET /authorize`: validate, issue a code and redirect back to the client.
async fn authorize_handler(
    State(state): State<AppState>,
    request: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    let start = Instant::now();
    let Query(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            metrics::record_authorize(metrics::OUTCOME_MALFORMED);
            return bad_request(rejection.body_text());
        }
    };
    let response = match state.flow.authorize(&request).await {
        Ok(redirect) => {
            metrics::record_authorize(metrics::OUTCOME_ISSUED);
            (
                StatusCode::FOUND,
                [
                    (header::LOCATION, redirect.location),
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                ],
                format!("{}\n", redirect.message),
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_authorize(e.oauth_error_code());
            ApiError(e).into_response()
        }
    };
    metrics::record_request("authorize", start.elapsed().as_secs_f64());
    response
}

/// `POST /token`: redeem a code for the token triple.
async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let start = Instant::now();
    let Form(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            metrics::record_token(metrics::OUTCOME_MALFORMED);
            return bad_request(rejection.body_text());
        }
    };
    let issuer = request_issuer(state.issuer.as_deref(), &headers);
    let response = match state.exchange.exchange(&issuer, &request).await {
        Ok(tokens) => {
            metrics::record_token(metrics::OUTCOME_ISSUED);
            (
                StatusCode::OK,
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                ],
                Json(tokens),
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_token(e.oauth_error_code());
            ApiError(e).into_response()
        }
    };
    metrics::record_request("token", start.elapsed().as_secs_f64());
    response
}

/// Issuer for minted tokens: the configured value, else `<scheme>://<host>`
/// from `X-Forwarded-Proto` (default `http`) and `Host` (default `localhost`).
fn request_issuer(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(issuer) = configured {
        return issuer.to_string();
    }
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    // Proxies may append a list; the first hop is the client-facing scheme
    let scheme = header_str("x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("http");
    let host = header_str(header::HOST.as_str()).unwrap_or("localhost");
    format!("{scheme}://{host}")
}

async fn ping_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        PING_MESSAGE,
    )
}

/// Health endpoint: status, redeemable code count, code lifetime, uptime and PKCE mode.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "outstanding_codes": state.store.outstanding().await,
        "code_ttl_secs": state.store.code_ttl().as_secs(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "pkce": state.pkce,
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
