pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::{AppConfig, ThumbnailBackend};
use crate::services::assets::AssetRepository;
use crate::services::local_storage::MemoryStorageService;
use crate::services::upload::UploadService;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Room for multipart boundaries and part headers on top of the file ceiling.
pub const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::assets::create_asset,
        api::handlers::assets::list_assets,
        api::handlers::assets::get_asset,
        api::handlers::uploads::upload_video,
        api::handlers::uploads::upload_thumbnail,
        api::handlers::uploads::get_cached_thumbnail,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::assets::CreateAssetRequest,
            api::handlers::health::HealthResponse,
            models::AssetResponse,
            models::MediaKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "assets", description = "Asset records"),
        (name = "uploads", description = "Video and thumbnail uploads"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<dyn AssetRepository>,
    pub uploads: Arc<UploadService>,
    /// Present when thumbnails are kept in process memory.
    pub thumbnail_cache: Option<Arc<MemoryStorageService>>,
    pub config: AppConfig,
}

fn body_limit(max_bytes: u64) -> DefaultBodyLimit {
    let limit = max_bytes.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(
            origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()),
        ))
    }
}

pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/assets",
            post(api::handlers::assets::create_asset).get(api::handlers::assets::list_assets),
        )
        .route("/api/assets/:id", get(api::handlers::assets::get_asset))
        .route(
            "/api/assets/:id/video",
            post(api::handlers::uploads::upload_video)
                .layer(body_limit(state.config.max_video_size)),
        )
        .route(
            "/api/assets/:id/thumbnail",
            post(api::handlers::uploads::upload_thumbnail)
                .layer(body_limit(state.config.max_thumbnail_size)),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route(
            "/api/thumbnails/*key",
            get(api::handlers::uploads::get_cached_thumbnail),
        )
        .merge(protected);

    if state.config.thumbnail_backend == ThumbnailBackend::Disk {
        app = app.nest_service("/assets", ServeDir::new(&state.config.assets_root));
    }

    app.layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}
