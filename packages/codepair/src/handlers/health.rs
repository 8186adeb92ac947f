use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::error::HubError;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<metrics::HealthStatus>, HubError> {
    let stats = state.hub.stats().await?;
    let snapshot = state.metrics.snapshot();

    Ok(Json(metrics::HealthStatus {
        status: "ok".to_string(),
        sessions: stats.sessions as u64,
        pending_cleanup: stats.pending_cleanup as u64,
        connections: snapshot.connections.active,
        uptime_secs: snapshot.uptime_secs,
    }))
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
