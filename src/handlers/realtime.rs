//! # Realtime Endpoint
//!
//! `GET /v1/realtime?device_id=X`: read-through cache over the latest
//! sample per device. The cache is best-effort; any cache failure degrades
//! to a database read.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::DeviceAuth;
use crate::cache::realtime_key;
use crate::error::{forbidden, not_found, ApiError};
use crate::handlers::types::SampleOut;
use crate::repositories::SampleRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RealtimeQuery {
    /// Device to query; must match the authenticated device.
    pub device_id: String,
}

/// Return the most recent sample for a device.
#[utoipa::path(
    get,
    path = "/v1/realtime",
    params(RealtimeQuery),
    responses(
        (status = 200, description = "Latest sample", body = SampleOut),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Device does not match token"),
        (status = 404, description = "No data for the device"),
    ),
    security(("device_token" = [])),
    tag = "realtime"
)]
pub async fn realtime(
    State(state): State<AppState>,
    DeviceAuth(auth_device_id): DeviceAuth,
    Query(query): Query<RealtimeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.device_id != auth_device_id {
        return Err(forbidden("Device ID does not match authenticated device."));
    }

    let cache_key = realtime_key(&query.device_id);

    if let Some(cached) = state.cache.get(&cache_key).await {
        match serde_json::from_str::<serde_json::Value>(&cached) {
            Ok(value) => return Ok(Json(value)),
            Err(err) => {
                // Unparsable cache entry: treat as a miss and overwrite below.
                tracing::warn!(key = %cache_key, error = %err, "discarding corrupt cache entry");
            }
        }
    }

    let sample = SampleRepository::new(&state.db)
        .latest(&query.device_id)
        .await?
        .ok_or_else(|| {
            not_found(format!(
                "No data found for device_id '{}'.",
                query.device_id
            ))
        })?;

    let out = SampleOut::from(sample);
    let value = serde_json::to_value(&out).map_err(|err| {
        tracing::error!(error = %err, "failed to serialize sample");
        crate::error::internal_error("Internal server error.")
    })?;

    state.cache.put(&cache_key, &value.to_string()).await;

    Ok(Json(value))
}
