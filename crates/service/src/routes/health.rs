//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Pings the integration store and the key-value store. Returns 503 Service
/// Unavailable if either is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.registry().ping().await {
        warn!(error = %e, "Readiness: integration store unreachable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    if let Err(e) = state.kv().ping().await {
        warn!(error = %e, "Readiness: key-value store unreachable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
