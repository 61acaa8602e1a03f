//! HTTP ingestion front end. Single endpoint per topic plus a batch endpoint
//! for facts, and the operational triad (`/live`, `/ready`, `/metrics`).

pub mod auth;
pub mod handlers;
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use factline_config::RuntimeConfig;
use factline_core::Cancellation;
use factline_sink::Sink;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tokio::signal;
use tracing::info;

use handlers::{handle_event, handle_fact, handle_facts_batch, live, metrics_endpoint, ready};
use rate_limit::RateLimiter;

/// State shared across every request handler.
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<Sink>,
    pub rate_limiter: Arc<RateLimiter>,
    pub api_key: Option<String>,
    pub max_payload_bytes: usize,
    pub started: Arc<AtomicBool>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Error type that implements `IntoResponse`, carrying the status code the
/// handler layer would otherwise have to re-derive from the error variant.
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, "request error: {:?}", self.error);
        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

/// Builds the routed app over a given [`AppState`], split out from [`run`]
/// so tests can drive it in-process without binding a real listener.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/facts", any(handle_fact))
        .route("/api/v1/facts/batch", any(handle_facts_batch))
        .route("/api/v1/events", any(handle_event))
        .route("/live", any(live))
        .route("/ready", any(ready))
        .route("/metrics", any(metrics_endpoint))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal(cancel: Cancellation) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
    cancel.cancel();
}

/// Builds the router, binds the listener, and serves until shutdown.
/// Returns after in-flight requests drain (bounded by a 10s window) and
/// closes the Sink.
pub async fn run(config: RuntimeConfig, store: Arc<dyn factline_storage::ObjectStore>) -> Result<()> {
    let cancel = Cancellation::new();

    let sink = Sink::new(
        config.sink.buffer_dir.clone().into(),
        store,
        cancel.clone(),
        Duration::from_secs(config.sink.rotation_interval_secs),
    )
    .await
    .context("failed to initialize durable sink")?;

    let rate_limiter = RateLimiter::start(
        config.rate_limit.rate,
        config.rate_limit.burst,
        cancel.clone(),
    );

    let recorder = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let state = AppState {
        sink: Arc::clone(&sink),
        rate_limiter,
        api_key: config.server.api_key.clone(),
        max_payload_bytes: config.request.max_payload_bytes,
        started: Arc::new(AtomicBool::new(true)),
        metrics_handle: recorder,
    };

    let app = build_router(state);

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen_addr: {}", config.server.listen_addr))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "ingestion server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("server error")?;

    tokio::time::timeout(Duration::from_secs(10), sink.close())
        .await
        .unwrap_or_else(|_| tracing::warn!("sink close did not complete within drain window"));

    info!("server shutdown complete");
    Ok(())
}
