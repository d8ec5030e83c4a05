//! Health endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness: the process is up
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: fomentos_common::VERSION,
    })
}

/// Readiness: the canonical store answers
pub async fn ready(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    match state.repo.ping().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ready",
            version: fomentos_common::VERSION,
        })),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
