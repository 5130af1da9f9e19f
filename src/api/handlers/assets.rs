use crate::AppState;
use crate::api::error::AppError;
use crate::models::{Asset, AssetResponse, MediaKind};
use crate::services::assets::RepositoryError;
use crate::utils::auth::Identity;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAssetRequest {
    pub title: String,
    pub description: Option<String>,
    pub kind: MediaKind,
}

pub(crate) fn parse_asset_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid ID".to_string()))
}

fn repository_error(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound(id) => AppError::NotFound(format!("Asset {} not found", id)),
        other => AppError::Internal(other.to_string()),
    }
}

#[utoipa::path(
    post,
    path = "/api/assets",
    request_body = CreateAssetRequest,
    responses(
        (status = 201, description = "Asset created", body = AssetResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "assets"
)]
pub async fn create_asset(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Json(req): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<AssetResponse>), AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".to_string()));
    }

    let asset = Asset::new(user_id, req.kind, title.to_string(), req.description);
    state.assets.create(&asset).await.map_err(repository_error)?;

    info!(asset_id = %asset.id, user_id = %user_id, kind = %asset.kind, "Asset created");
    Ok((StatusCode::CREATED, Json(AssetResponse::new(&asset, None))))
}

#[utoipa::path(
    get,
    path = "/api/assets",
    responses(
        (status = 200, description = "Assets owned by the caller", body = Vec<AssetResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "assets"
)]
pub async fn list_assets(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
) -> Result<Json<Vec<AssetResponse>>, AppError> {
    let assets = state
        .assets
        .list_by_owner(user_id)
        .await
        .map_err(repository_error)?;

    let mut responses = Vec::with_capacity(assets.len());
    for asset in &assets {
        responses.push(state.uploads.resolve(asset).await?);
    }
    Ok(Json(responses))
}

#[utoipa::path(
    get,
    path = "/api/assets/{id}",
    params(
        ("id" = String, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Asset with a freshly resolved URL", body = AssetResponse),
        (status = 400, description = "Invalid ID"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Asset not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "assets"
)]
pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssetResponse>, AppError> {
    let id = parse_asset_id(&id)?;
    let asset = state.assets.get(id).await.map_err(repository_error)?;
    Ok(Json(state.uploads.resolve(&asset).await?))
}
