//! HTTP handlers for the exporter.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse
};
use serde::Serialize;
use std::sync::Arc;

use crate::driver::CycleStatus;
use crate::error::Result;
use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub cycle: CycleStatus
}

/// Reports whether the last cycle succeeded.
///
/// Answers 503 while the driver is failed or the latest cycle errored; the
/// published series are still served on `/metrics` in that case.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cycle = state.status();
    let (code, status) = if cycle.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        tracing::debug!(state = ?cycle.state, "Health check reporting unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            cycle
        })
    )
}

/// Prometheus scrape endpoint.
///
/// Serves the `mysql_permission` family followed by the exporter's own
/// metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let mut body = state.registry.render()?;

    if let Some(handle) = &state.telemetry {
        handle.run_upkeep();
        body.push_str(&handle.render());
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body
    ))
}
