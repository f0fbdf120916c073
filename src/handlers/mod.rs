//! # API Handlers
//!
//! HTTP endpoint handlers for the telemetry API.

pub mod ingest;
pub mod realtime;
pub mod series;
pub mod types;

use axum::response::Json;

use types::HealthResponse;

/// Liveness endpoint: no authentication, no database access. Reachable only
/// on the internal network boundary.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests;
