//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DatabaseHealth,
    pub email_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

fn overall_status(db_connected: bool) -> (StatusCode, &'static str) {
    if db_connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

/// `GET /api/health`: database connectivity, pool usage and version.
///
/// Answers 503 with the same body when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();
    let connected = persistence::db::ping(&state.pool).await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    let (code, status) = overall_status(connected);
    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database: DatabaseHealth {
            connected,
            latency_ms: connected.then_some(latency_ms),
            pool_size: state.pool.size(),
            idle_connections: state.pool.num_idle(),
        },
        email_enabled: state.email.is_enabled(),
    };

    (code, Json(response))
}

/// `GET /api/health/live`: the process is up.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse { status: "alive" })
}

/// `GET /api/health/ready`: the database answers queries.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    match persistence::db::ping(&state.pool).await {
        Ok(()) => Ok(Json(StatusResponse { status: "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
