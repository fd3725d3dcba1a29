//! HTTP API and Streaming Endpoint
//!
//! One axum server hosts everything the bridge exposes:
//!
//! - `GET /` - Inline status page naming the endpoints
//! - `GET /api/health` - JSON health status with broker connectivity
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (checks the broker connection)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/data/current` - Most recent reading
//! - `GET /api/data/history` - Reading history, oldest-first
//! - `GET /ws` - WebSocket streaming endpoint

mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::infrastructure::bridge::SharedBridge;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::mqtt::BrokerState;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: HealthStatus,
    /// Whether the MQTT broker is currently connected.
    pub broker_connected: bool,
    /// Bridge version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connected WebSocket client count.
    pub clients: usize,
    /// Readings accepted since startup.
    pub readings_ingested: u64,
    /// Broker connection detail.
    pub broker: BrokerInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Broker connected, feed flowing.
    Healthy,
    /// Serving cached history while the broker is unreachable.
    Degraded,
}

/// Broker connection detail.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerInfo {
    /// Connection state name.
    pub state: String,
    /// Messages received from the feed.
    pub messages_received: u64,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Time of the last successful connect, if any.
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Marker returned by `current` before any reading has arrived.
#[derive(Debug, Clone, Serialize)]
pub struct NoDataResponse {
    /// Human-readable marker.
    pub message: &'static str,
}

impl Default for NoDataResponse {
    fn default() -> Self {
        Self {
            message: "No data available yet",
        }
    }
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server and the WebSocket endpoint.
pub struct AppState {
    bridge: SharedBridge,
    broker: Arc<BrokerState>,
    version: String,
    started_at: Instant,
    client_channel_capacity: usize,
    cancel: CancellationToken,
}

impl AppState {
    /// Create new server state.
    #[must_use]
    pub fn new(
        bridge: SharedBridge,
        broker: Arc<BrokerState>,
        version: String,
        client_channel_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            broker,
            version,
            started_at: Instant::now(),
            client_channel_capacity,
            cancel,
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// The bridge's HTTP server.
pub struct ApiServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the full API router. Exposed so tests can drive the routes
/// without binding a port.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/data/current", get(current_handler))
        .route("/api/data/history", get(history_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

const INDEX_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Lidar Stream Bridge</title></head>\n<body>\n<h1>Lidar Stream Bridge</h1>\n<ul>\n<li><code>GET /api/data/current</code> - latest reading</li>\n<li><code>GET /api/data/history</code> - recent readings</li>\n<li><code>GET /api/health</code> - service health</li>\n<li><code>GET /ws</code> - live reading stream (WebSocket)</li>\n</ul>\n</body>\n</html>\n";

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(build_health_response(&state))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.broker.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn current_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.bridge.latest().map_or_else(
        || Json(NoDataResponse::default()).into_response(),
        |reading| Json(reading).into_response(),
    )
}

async fn history_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.bridge.history())
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let broker_connected = state.broker.is_connected();
    let status = if broker_connected {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    HealthResponse {
        status,
        broker_connected,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        clients: state.bridge.client_count(),
        readings_ingested: state.bridge.readings_ingested(),
        broker: BrokerInfo {
            state: state.broker.get_state().as_str().to_string(),
            messages_received: state.broker.messages_received(),
            reconnect_attempts: state.broker.reconnect_attempts(),
            last_connected_at: state.broker.last_connected_at(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
