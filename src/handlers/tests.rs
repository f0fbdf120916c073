//! Router-level handler tests.
//!
//! These tests exercise every guard that fires before the database is
//! touched, so they run against a disconnected SeaORM handle: auth, size
//! limits, schema validation, device binding, and frame validation.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use crate::auth::TokenMap;
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::server::{create_app, AppState};

const TEST_TOKEN: &str = "test-token-123";
const TEST_DEVICE: &str = "inv-01";

/// Body limit small enough that boundary tests stay readable.
const TEST_MAX_BYTES: usize = 256;

fn test_state() -> AppState {
    let config = AppConfig {
        max_request_bytes: TEST_MAX_BYTES,
        max_samples_per_request: 2,
        ..Default::default()
    };
    AppState {
        config: Arc::new(config),
        tokens: Arc::new(TokenMap::parse(&format!("{TEST_TOKEN}:{TEST_DEVICE}"))),
        db: sea_orm::DatabaseConnection::default(),
        // Nothing listens on this port; cache calls degrade to no-ops.
        cache: Cache::new("redis://127.0.0.1:1/", 5),
    }
}

fn sample_json(device_id: &str, ts: &str) -> serde_json::Value {
    serde_json::json!({
        "device_id": device_id,
        "ts": ts,
        "pv_power_w": 3450.0,
        "battery_power_w": -500.0,
        "battery_soc_pct": 55.5,
        "load_power_w": 800.0,
        "export_power_w": 1450.0
    })
}

async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = create_app(test_state()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

fn ingest_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn health_is_open_and_ok() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_auth_header_returns_401_with_challenge() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .body(Body::from(r#"{"samples":[]}"#))
        .unwrap();
    let response = create_app(test_state()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer"
    );
}

#[tokio::test]
async fn invalid_token_returns_401() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", "Bearer wrong-token")
        .body(Body::from(r#"{"samples":[]}"#))
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid or expired token.");
}

#[tokio::test]
async fn non_bearer_scheme_returns_401() {
    let request = Request::builder()
        .uri("/v1/realtime?device_id=inv-01")
        .header("authorization", "Basic dGVzdDoxMjM=")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_batch_returns_zero_inserted_without_database() {
    let (status, body) = send(ingest_request(r#"{"samples":[]}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 0);
}

#[tokio::test]
async fn body_at_limit_passes_size_guard() {
    // Exactly max_request_bytes, padded with trailing whitespace.
    let mut payload = r#"{"samples":[]}"#.to_string();
    payload.push_str(&" ".repeat(TEST_MAX_BYTES - payload.len()));
    assert_eq!(payload.len(), TEST_MAX_BYTES);

    let (status, body) = send(ingest_request(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 0);
}

#[tokio::test]
async fn body_one_byte_over_limit_returns_413() {
    let mut payload = r#"{"samples":[]}"#.to_string();
    payload.push_str(&" ".repeat(TEST_MAX_BYTES + 1 - payload.len()));
    assert_eq!(payload.len(), TEST_MAX_BYTES + 1);

    let (status, _) = send(ingest_request(payload)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_content_length_returns_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .header("content-length", "not-a-number")
        .body(Body::from(r#"{"samples":[]}"#))
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid Content-Length header.");
}

#[tokio::test]
async fn declared_oversize_content_length_returns_413_before_parse() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .header("content-length", (TEST_MAX_BYTES + 1).to_string())
        .body(Body::from("this is not even json"))
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_body_returns_422() {
    let (status, _) = send(ingest_request(r#"{"samples": "nope"}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn soc_out_of_range_returns_422() {
    let mut sample = sample_json(TEST_DEVICE, "2026-02-15T10:30:00Z");
    sample["battery_soc_pct"] = serde_json::json!(140.0);
    let payload = serde_json::json!({ "samples": [sample] }).to_string();
    let (status, _) = send(ingest_request(payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn batch_over_sample_limit_returns_413() {
    // max_samples_per_request is 2 in the test config.
    let samples: Vec<_> = (0..3)
        .map(|i| sample_json(TEST_DEVICE, &format!("2026-02-15T10:3{i}:00Z")))
        .collect();
    let payload = serde_json::json!({ "samples": samples }).to_string();
    let (status, body) = send(ingest_request(payload)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["detail"].as_str().unwrap().contains("Batch size 3"));
}

#[tokio::test]
async fn device_mismatch_returns_403_before_any_write() {
    let payload = serde_json::json!({
        "samples": [sample_json("dev-B", "2026-02-15T10:30:00Z")]
    })
    .to_string();
    let (status, body) = send(ingest_request(payload)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["detail"].as_str().unwrap().contains("dev-B"));
}

#[tokio::test]
async fn realtime_device_mismatch_returns_403() {
    let request = Request::builder()
        .uri("/v1/realtime?device_id=dev-B")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["detail"],
        "Device ID does not match authenticated device."
    );
}

#[tokio::test]
async fn series_invalid_frame_returns_422_with_allowed_values() {
    let request = Request::builder()
        .uri("/v1/series?device_id=inv-01&frame=week")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("day"));
    assert!(detail.contains("month"));
    assert!(detail.contains("year"));
    assert!(detail.contains("all"));
}

#[tokio::test]
async fn series_device_mismatch_returns_403() {
    let request = Request::builder()
        .uri("/v1/series?device_id=dev-B&frame=day")
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
