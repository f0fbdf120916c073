//! # Ingest Endpoint
//!
//! `POST /v1/ingest`: size-bounded, schema-validated, idempotent batch
//! insert. The guard order is part of the contract: Content-Length checks
//! run before the body is touched, schema validation before the batch-size
//! check, and the device-binding check before any write.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_LENGTH, HeaderMap},
    response::Json,
};
use metrics::counter;

use crate::auth::DeviceAuth;
use crate::cache::realtime_key;
use crate::error::{bad_request, forbidden, payload_too_large, validation_error, ApiError};
use crate::handlers::types::{IngestPayload, IngestResponse, SampleIn};
use crate::repositories::SampleRepository;
use crate::server::AppState;

/// Ingest a batch of telemetry samples.
#[utoipa::path(
    post,
    path = "/v1/ingest",
    request_body = IngestPayload,
    responses(
        (status = 200, description = "Batch ingested", body = IngestResponse),
        (status = 400, description = "Malformed Content-Length"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Sample device does not match token"),
        (status = 413, description = "Body or batch size over limit"),
        (status = 422, description = "Schema validation failure"),
    ),
    security(("device_token" = [])),
    tag = "ingest"
)]
pub async fn ingest(
    State(state): State<AppState>,
    DeviceAuth(auth_device_id): DeviceAuth,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let max_request_bytes = state.config.max_request_bytes;

    // Content-Length guards run before the body is parsed.
    if let Some(content_length) = headers.get(CONTENT_LENGTH) {
        let declared: u64 = content_length
            .to_str()
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| bad_request("Invalid Content-Length header."))?;
        if declared > max_request_bytes as u64 {
            return Err(payload_too_large(format!(
                "Request body exceeds limit of {max_request_bytes} bytes."
            )));
        }
    }

    if body.len() > max_request_bytes {
        return Err(payload_too_large(format!(
            "Request body exceeds limit of {max_request_bytes} bytes."
        )));
    }

    let payload: IngestPayload = serde_json::from_slice(&body)
        .map_err(|err| validation_error(format!("Invalid ingest payload: {err}")))?;

    for (index, sample) in payload.samples.iter().enumerate() {
        sample.validate(index).map_err(validation_error)?;
    }

    // Empty batch: respond without a database round-trip.
    if payload.samples.is_empty() {
        return Ok(Json(IngestResponse { inserted: 0 }));
    }

    let max_samples = state.config.max_samples_per_request;
    if payload.samples.len() > max_samples {
        return Err(payload_too_large(format!(
            "Batch size {} exceeds limit of {max_samples}. Split into smaller batches.",
            payload.samples.len()
        )));
    }

    // Every sample must belong to the authenticated device, checked in
    // full before any write.
    for sample in &payload.samples {
        if sample.device_id != auth_device_id {
            return Err(forbidden(format!(
                "Sample device_id '{}' does not match authenticated device_id '{}'.",
                sample.device_id, auth_device_id
            )));
        }
    }

    let batch_len = payload.samples.len();
    let models = payload
        .samples
        .into_iter()
        .map(SampleIn::into_active_model)
        .collect();

    let inserted = SampleRepository::new(&state.db).insert_batch(models).await?;

    counter!("ingest_samples_received_total").increment(batch_len as u64);
    counter!("ingest_samples_inserted_total").increment(inserted);
    tracing::info!(
        device_id = %auth_device_id,
        received = batch_len,
        inserted,
        "ingested sample batch"
    );

    if inserted > 0 {
        state
            .cache
            .invalidate(&realtime_key(&auth_device_id))
            .await;
    }

    Ok(Json(IngestResponse { inserted }))
}
