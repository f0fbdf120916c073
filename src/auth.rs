//! # Authentication and Authorization
//!
//! Per-device bearer authentication for the `/v1` endpoints. Tokens are
//! configured as a `token:device_id,...` string and compared in constant
//! time; a successful match binds the device identity to the request.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::{unauthorized, ApiError};
use crate::server::AppState;

/// Token-to-device binding parsed from the `DEVICE_TOKENS` configuration.
#[derive(Debug, Default)]
pub struct TokenMap {
    entries: Vec<(String, String)>,
}

impl TokenMap {
    /// Parses a `tok1:dev1,tok2:dev2` string. Entries without a colon
    /// separator are skipped with a warning; whitespace around tokens and
    /// device ids is stripped. Token material is never logged.
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        for (idx, entry) in raw.split(',').enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((token, device_id)) = entry.split_once(':') else {
                tracing::warn!(
                    position = idx,
                    "skipping malformed DEVICE_TOKENS entry (no colon separator)"
                );
                continue;
            };
            let token = token.trim();
            let device_id = device_id.trim();
            if !token.is_empty() && !device_id.is_empty() {
                entries.push((token.to_string(), device_id.to_string()));
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the device id bound to `token`, comparing against every
    /// configured token in constant time.
    pub fn lookup(&self, token: &str) -> Option<&str> {
        let mut found = None;
        for (configured, device_id) in &self.entries {
            if bool::from(ConstantTimeEq::ct_eq(
                token.as_bytes(),
                configured.as_bytes(),
            )) {
                found = Some(device_id.as_str());
            }
        }
        found
    }
}

/// Authenticated device identity, inserted into request extensions by the
/// auth middleware and extracted by handlers.
#[derive(Debug, Clone)]
pub struct DeviceAuth(pub String);

impl FromRef<AppState> for Arc<TokenMap> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.tokens)
    }
}

/// Authentication middleware for `/v1` routes: validates the bearer token
/// and binds the matching device id into the request.
pub async fn device_auth_middleware(
    State(tokens): State<Arc<TokenMap>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let device_id = tokens
        .lookup(token)
        .ok_or_else(|| unauthorized("Invalid or expired token."))?
        .to_string();

    request.extensions_mut().insert(DeviceAuth(device_id));
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing authorization credentials."))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized("Invalid Authorization header."))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized("Authorization header must use Bearer scheme."))
        })
}

impl<S> FromRequestParts<S> for DeviceAuth
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<DeviceAuth>()
            .cloned()
            .ok_or_else(|| unauthorized("Missing authorization credentials."))
    }
}
