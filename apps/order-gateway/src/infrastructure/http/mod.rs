//! Admin HTTP Server
//!
//! Local HTTP facade for operators and probes.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with channel detail
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (requires an active control channel)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/accounts` - accounts known to the execution backend
//! - `POST /api/orders` - dispatch an order command locally

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchCoordinator;
use crate::domain::{DispatchStatus, OrderCommand};
use crate::infrastructure::channel::{ChannelPhase, ChannelState};
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Admin server failures.
#[derive(Debug, thiserror::Error)]
pub enum AdminServerError {
    /// Could not bind the listen port.
    #[error("failed to bind admin port {0}: {1}")]
    BindFailed(u16, String),

    /// HTTP server failed while running.
    #[error("admin server failed: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Control channel detail.
    pub channel: ChannelStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Control channel active.
    Healthy,
    /// Control channel connecting or registering.
    Degraded,
    /// Control channel down.
    Unhealthy,
}

/// Control channel status detail.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    /// Connection phase.
    pub phase: String,
    /// Whether the channel is active.
    pub connected: bool,
    /// Frames received across all epochs.
    pub frames_received: u64,
    /// Reconnection attempts since startup.
    pub reconnect_attempts: u32,
    /// Session id announced in the current epoch.
    pub session_id: Option<String>,
    /// Accounts announced with the session.
    pub accounts: Vec<String>,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the admin server.
pub struct AdminState {
    version: String,
    started_at: Instant,
    channel: Arc<ChannelState>,
    dispatcher: Arc<DispatchCoordinator>,
}

impl AdminState {
    /// Create new admin server state.
    #[must_use]
    pub fn new(
        version: String,
        channel: Arc<ChannelState>,
        dispatcher: Arc<DispatchCoordinator>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            channel,
            dispatcher,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Admin HTTP server.
pub struct AdminServer {
    port: u16,
    state: Arc<AdminState>,
    cancel: CancellationToken,
}

impl AdminServer {
    /// Create a new admin server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AdminState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the admin server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `AdminServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), AdminServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/accounts", get(accounts_handler))
            .route("/api/orders", post(orders_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AdminServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Admin server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| AdminServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Admin server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    if state.channel.is_active() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    let body = metrics::render();
    if body.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "Metrics not initialized".to_string(),
        )
    } else {
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
    }
}

async fn accounts_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    match state.dispatcher.accounts().await {
        Ok(accounts) => (StatusCode::OK, Json(accounts)).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

async fn orders_handler(
    State(state): State<Arc<AdminState>>,
    Json(command): Json<OrderCommand>,
) -> impl IntoResponse {
    let result = state.dispatcher.dispatch(command).await;
    let status_code = match result.status {
        DispatchStatus::Submitted | DispatchStatus::IdempotentReplay => StatusCode::OK,
        DispatchStatus::Error => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status_code, Json(result))
}

fn build_health_response(state: &AdminState) -> HealthResponse {
    let phase = state.channel.phase();
    let status = match phase {
        ChannelPhase::Active => HealthStatus::Healthy,
        ChannelPhase::Connecting | ChannelPhase::Handshaking => HealthStatus::Degraded,
        ChannelPhase::Disconnected => HealthStatus::Unhealthy,
    };

    let session = state.channel.session();
    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        channel: ChannelStatus {
            phase: phase.as_str().to_string(),
            connected: phase == ChannelPhase::Active,
            frames_received: state.channel.frames_received(),
            reconnect_attempts: state.channel.reconnect_attempts(),
            session_id: session.as_ref().map(|s| s.session_id.clone()),
            accounts: session.map(|s| s.accounts).unwrap_or_default(),
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimBackend;
    use crate::infrastructure::persistence::SqliteStateStore;
    use test_case::test_case;

    async fn admin_state(phase: ChannelPhase) -> (tempfile::TempDir, AdminState) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("gateway.db").display());
        let store = Arc::new(SqliteStateStore::connect(&url).await.unwrap());
        let backend = Arc::new(SimBackend::new(vec!["ACC1".to_string()]));
        let dispatcher = Arc::new(DispatchCoordinator::new(backend, store, 2));
        let channel = Arc::new(ChannelState::new());
        channel.set_phase(phase);
        (
            dir,
            AdminState::new("0.1.0-test".to_string(), channel, dispatcher),
        )
    }

    #[test_case(ChannelPhase::Active, HealthStatus::Healthy)]
    #[test_case(ChannelPhase::Connecting, HealthStatus::Degraded)]
    #[test_case(ChannelPhase::Handshaking, HealthStatus::Degraded)]
    #[test_case(ChannelPhase::Disconnected, HealthStatus::Unhealthy)]
    #[tokio::test]
    async fn health_status_follows_channel_phase(phase: ChannelPhase, expected: HealthStatus) {
        let (_dir, state) = admin_state(phase).await;
        let response = build_health_response(&state);
        assert_eq!(response.status, expected);
        assert_eq!(response.channel.phase, phase.as_str());
    }

    #[tokio::test]
    async fn health_response_includes_session_and_counters() {
        let (_dir, state) = admin_state(ChannelPhase::Active).await;
        state.channel.increment_frames();
        state
            .channel
            .set_session(crate::domain::Session::new("s-9".to_string(), vec![]));

        let response = build_health_response(&state);
        assert!(response.channel.connected);
        assert_eq!(response.channel.frames_received, 1);
        assert_eq!(response.channel.session_id.as_deref(), Some("s-9"));
    }
}
