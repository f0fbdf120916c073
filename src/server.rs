//! # Server Configuration
//!
//! Router assembly and server startup for the telemetry API.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{device_auth_middleware, TokenMap};
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenMap>,
    pub db: DatabaseConnection,
    pub cache: Cache,
}

/// Creates and configures the Axum application router.
///
/// `/v1/*` routes sit behind the device-token middleware; `/health` and the
/// OpenAPI docs do not. The body limit leaves headroom above the ingest
/// guard so oversized requests get the documented 413 body.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/ingest", post(handlers::ingest::ingest))
        .route("/v1/realtime", get(handlers::realtime::realtime))
        .route("/v1/series", get(handlers::series::series))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            device_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(
            state.config.max_request_bytes.saturating_add(1024),
        ))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = TokenMap::parse(&config.device_tokens);
    if tokens.is_empty() {
        return Err("DEVICE_TOKENS contains no valid token:device_id pairs".into());
    }
    tracing::info!(devices = tokens.len(), "device token map loaded");

    let cache = Cache::new(&config.redis_url, config.cache_ttl_s);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        tokens: Arc::new(tokens),
        db,
        cache,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::ingest::ingest,
        crate::handlers::realtime::realtime,
        crate::handlers::series::series,
    ),
    components(
        schemas(
            crate::handlers::types::SampleIn,
            crate::handlers::types::IngestPayload,
            crate::handlers::types::IngestResponse,
            crate::handlers::types::SampleOut,
            crate::handlers::types::BucketOut,
            crate::handlers::types::SeriesResponse,
            crate::handlers::types::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Sungrow Telemetry API",
        description = "Ingest and read API for Sungrow inverter telemetry",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "device_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
