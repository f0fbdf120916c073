//! Application-level integration tests that run without external services:
//! router assembly, OpenAPI exposure, and per-token device binding.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use sungrow_api::auth::TokenMap;
use sungrow_api::cache::Cache;
use sungrow_api::config::AppConfig;
use sungrow_api::server::{create_app, AppState};

fn state_with_tokens(raw_tokens: &str) -> AppState {
    AppState {
        config: Arc::new(AppConfig::default()),
        tokens: Arc::new(TokenMap::parse(raw_tokens)),
        db: sea_orm::DatabaseConnection::default(),
        cache: Cache::new("redis://127.0.0.1:1/", 5),
    }
}

async fn ingest_empty_batch(app_tokens: &str, bearer: &str) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", format!("Bearer {bearer}"))
        .body(Body::from(r#"{"samples":[]}"#))
        .unwrap();
    create_app(state_with_tokens(app_tokens))
        .oneshot(request)
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn openapi_document_is_served() {
    let request = Request::builder()
        .uri("/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = create_app(state_with_tokens("tok:dev"))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
    for path in ["/health", "/v1/ingest", "/v1/realtime", "/v1/series"] {
        assert!(
            doc["paths"].get(path).is_some(),
            "missing path {path} in OpenAPI document"
        );
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let request = Request::builder()
        .uri("/v2/ingest")
        .body(Body::empty())
        .unwrap();
    let response = create_app(state_with_tokens("tok:dev"))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn each_token_authenticates_independently() {
    let tokens = "tok-a:dev-a,tok-b:dev-b";
    assert_eq!(ingest_empty_batch(tokens, "tok-a").await, StatusCode::OK);
    assert_eq!(ingest_empty_batch(tokens, "tok-b").await, StatusCode::OK);
    assert_eq!(
        ingest_empty_batch(tokens, "tok-c").await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn token_binds_its_own_device_for_writes() {
    let tokens = "tok-a:dev-a,tok-b:dev-b";
    let sample = serde_json::json!({
        "device_id": "dev-b",
        "ts": "2026-02-15T10:30:00Z",
        "pv_power_w": 100.0,
        "battery_power_w": 0.0,
        "battery_soc_pct": 50.0,
        "load_power_w": 50.0,
        "export_power_w": 10.0
    });
    let payload = serde_json::json!({ "samples": [sample] }).to_string();

    // tok-a is bound to dev-a, so a dev-b sample must be rejected.
    let request = Request::builder()
        .method("POST")
        .uri("/v1/ingest")
        .header("authorization", "Bearer tok-a")
        .body(Body::from(payload))
        .unwrap();
    let response = create_app(state_with_tokens(tokens))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
