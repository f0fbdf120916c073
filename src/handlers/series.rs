//! # Series Endpoint
//!
//! `GET /v1/series?device_id=X&frame=F`: time-bucketed rollups from the
//! continuous aggregate views, with a raw `time_bucket` fallback when a
//! view is missing.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::DeviceAuth;
use crate::error::{forbidden, validation_error, ApiError};
use crate::handlers::types::{BucketOut, SeriesResponse};
use crate::repositories::sample::Frame;
use crate::repositories::SampleRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SeriesQuery {
    /// Device to query; must match the authenticated device.
    pub device_id: String,
    /// Time frame: day, month, year, or all.
    pub frame: String,
}

/// Return time-bucketed historical rollups for a device.
#[utoipa::path(
    get,
    path = "/v1/series",
    params(SeriesQuery),
    responses(
        (status = 200, description = "Bucketed series", body = SeriesResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Device does not match token"),
        (status = 422, description = "Invalid frame value"),
    ),
    security(("device_token" = [])),
    tag = "series"
)]
pub async fn series(
    State(state): State<AppState>,
    DeviceAuth(auth_device_id): DeviceAuth,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<SeriesResponse>, ApiError> {
    if query.device_id != auth_device_id {
        return Err(forbidden("Device ID does not match authenticated device."));
    }

    let frame = Frame::parse(&query.frame).ok_or_else(|| {
        validation_error(format!(
            "Invalid frame '{}'. Must be one of: {}.",
            query.frame,
            Frame::ALLOWED.join(", ")
        ))
    })?;

    let rows = SampleRepository::new(&state.db)
        .series(&query.device_id, frame)
        .await?;

    tracing::debug!(
        device_id = %query.device_id,
        frame = frame.as_str(),
        rows = rows.len(),
        "series query complete"
    );

    Ok(Json(SeriesResponse {
        device_id: query.device_id,
        frame: frame.as_str().to_string(),
        series: rows.into_iter().map(BucketOut::from).collect(),
    }))
}
