//! # Error Handling
//!
//! Unified error handling for the telemetry API. Every user-visible failure
//! is an [`ApiError`] rendering a `{"detail": ...}` JSON body with the
//! documented status code; 401 responses additionally carry a
//! `WWW-Authenticate: Bearer` challenge.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// API error carrying an HTTP status and a `detail` payload.
///
/// `detail` is either a plain string or a structured value (e.g. the list
/// of schema violations produced by body validation).
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: serde_json::Value,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<serde_json::Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = axum::Json(json!({ "detail": self.detail }));
        let mut response = (self.status, body).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!(error = %err, "database error");
        internal_error("Internal server error.")
    }
}

// Constructors for the documented status codes.

pub fn bad_request(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, detail.into())
}

pub fn unauthorized(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, detail.into())
}

pub fn forbidden(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, detail.into())
}

pub fn not_found(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, detail.into())
}

pub fn payload_too_large(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, detail.into())
}

pub fn validation_error(detail: impl Into<serde_json::Value>) -> ApiError {
    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
}

pub fn internal_error(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthorized_carries_bearer_challenge() {
        let response = unauthorized("Invalid or expired token.").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn detail_body_shape() {
        let response = forbidden("Device ID does not match authenticated device.").into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value["detail"],
            "Device ID does not match authenticated device."
        );
    }

    #[tokio::test]
    async fn validation_error_accepts_structured_detail() {
        let response = validation_error(json!([{"loc": ["samples", 0, "ts"], "msg": "invalid"}]))
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
