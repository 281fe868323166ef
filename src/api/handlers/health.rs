//! Liveness, status and health endpoints.

use axum::{extract::State, Json};
use tracing::{instrument, warn};

use crate::api::middleware::error::ApiError;
use crate::api::models::{HealthResponse, HealthStatus, StatusResponse};
use crate::app_state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/ping",
    responses(
        (status = 200, description = "Server is up", body = String)
    ),
    tag = "Health"
)]
/// Liveness probe.
pub async fn ping() -> &'static str {
    "pong"
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Uptime, chain ID and latest canonical header", body = StatusResponse)
    ),
    tag = "Health"
)]
/// Returns the in-memory status published by the reconciliation engine.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.status.snapshot().into())
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "Health"
)]
/// Returns store connectivity, header counts and the latest head.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let snapshot = state.status.snapshot();

    let database_status = match state.repository.health_check().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            HealthStatus::Unhealthy
        }
    };

    let (total, orphans) = if database_status == HealthStatus::Healthy {
        state.repository.header_counts().await?
    } else {
        (0, 0)
    };

    let latest_block = snapshot.latest_header.as_ref().map(|h| h.number);

    let status = match (database_status, latest_block) {
        (HealthStatus::Healthy, Some(_)) => HealthStatus::Healthy,
        (HealthStatus::Healthy, None) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };

    Ok(Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: snapshot.uptime,
        chain_id: snapshot.chain_id,
        latest_block,
        canonical_headers: total - orphans,
        orphan_headers: orphans,
        database_status,
    }))
}
