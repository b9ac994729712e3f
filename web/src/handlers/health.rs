//! Health and metrics endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tripdesk_core::OrderStore;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness check.
///
/// ```text
/// GET /health
/// {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Prometheus scrape body, or 404 when no recorder is installed.
#[allow(clippy::unused_async)]
pub async fn metrics<S: OrderStore>(State(state): State<AppState<S>>) -> (StatusCode, String) {
    state.metrics.as_ref().map_or_else(
        || (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
        |handle| (StatusCode::OK, handle.render()),
    )
}
