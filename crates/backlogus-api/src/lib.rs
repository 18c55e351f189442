//! # backlogus-api
//!
//! HTTP server for BackLogus backups: whole-user export to a zip archive and
//! transactional import from one.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::map_response_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use backlogus_core::ImageCache;
use backlogus_db::Database;

pub use config::ServerConfig;
pub use error::ApiError;
use services::BackupService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Shared image cache, constructed once at startup.
    pub image_cache: Arc<dyn ImageCache>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, image_cache: Arc<dyn ImageCache>, config: ServerConfig) -> Self {
        Self {
            db,
            image_cache,
            config: Arc::new(config),
        }
    }

    pub fn backup_service(&self) -> BackupService {
        BackupService::new(
            self.db.clone(),
            self.image_cache.clone(),
            self.config.restore_budget,
            self.config.image_restore_timeout,
        )
    }
}

/// Time-ordered UUIDv7 request IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
        .allow_credentials(true)
}

/// Give body-limit rejections the same JSON shape as handler errors.
async fn json_upload_limit(State(state): State<AppState>, response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.as_bytes().starts_with(b"application/json"))
        .unwrap_or(false);
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::upload_too_large(state.config.max_upload_bytes).into_response();
    }
    response
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Large uploads: lift the extractor default and enforce our own ceiling.
    let import = Router::new()
        .route("/api/backup/import", post(handlers::backup::import_backup))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes))
        .layer(map_response_with_state(state.clone(), json_upload_limit))
        .layer(TimeoutLayer::new(state.config.import_timeout));

    let mut app = Router::new()
        .route("/api/backup", get(handlers::backup::export_backup))
        .merge(import)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));

    if !state.config.cors_allowed_origins.is_empty() {
        app = app.layer(cors_layer(&state.config.cors_allowed_origins));
    }

    app.with_state(state)
}
