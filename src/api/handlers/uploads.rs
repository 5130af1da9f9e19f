use crate::{AppState, MULTIPART_OVERHEAD};
use crate::api::error::AppError;
use crate::api::handlers::assets::parse_asset_id;
use crate::models::{AssetResponse, MediaKind};
use crate::services::upload::UploadRequest;
use crate::utils::auth::Identity;
use axum::{
    Extension, Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::warn;

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(format!("Unable to parse upload: {}", e))
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn upload(
    state: AppState,
    kind: MediaKind,
    user_id: uuid::Uuid,
    id: String,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AssetResponse>, AppError> {
    let asset_id = parse_asset_id(&id)?;

    let uploads = state.uploads.clone();
    let policy = uploads.policy(kind);

    // Content-Length covers the whole multipart body; the stager enforces the
    // exact file ceiling.
    if let Some(len) = content_length(&headers) {
        let limit = policy.max_bytes.saturating_add(MULTIPART_OVERHEAD);
        if len > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "Request of {} bytes exceeds the {} byte limit",
                len, limit
            )));
        }
    }

    let mut multipart =
        multipart.map_err(|e| AppError::BadRequest(format!("Unable to parse upload: {}", e)))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(policy.field_name) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let body = StreamReader::new(field.map_err(std::io::Error::other));
        let request = UploadRequest {
            asset_id,
            identity: user_id,
            declared_len: None,
            content_type,
            body,
        };

        let asset = match kind {
            MediaKind::Video => uploads.upload_video(request).await?,
            MediaKind::Thumbnail => uploads.upload_thumbnail(request).await?,
        };
        let response = match uploads.resolve(&asset).await {
            Ok(response) => response,
            Err(e) => {
                warn!(asset_id = %asset.id, "Upload committed but URL resolution failed: {}", e);
                AssetResponse::new(&asset, None)
            }
        };
        return Ok(Json(response));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{}'",
        policy.field_name
    )))
}

#[utoipa::path(
    post,
    path = "/api/assets/{id}/video",
    params(
        ("id" = String, Path, description = "Asset ID")
    ),
    request_body(content = Multipart, description = "MP4 file in the `video` field"),
    responses(
        (status = 200, description = "Video committed; `url` is null if it could not be resolved", body = AssetResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the asset owner"),
        (status = 404, description = "Asset not found"),
        (status = 413, description = "Upload too large"),
        (status = 415, description = "Media type not allowed"),
        (status = 500, description = "Processing or metadata failure"),
        (status = 503, description = "Object storage unavailable")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "uploads"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AssetResponse>, AppError> {
    upload(state, MediaKind::Video, user_id, id, headers, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/assets/{id}/thumbnail",
    params(
        ("id" = String, Path, description = "Asset ID")
    ),
    request_body(content = Multipart, description = "JPEG or PNG file in the `thumbnail` field"),
    responses(
        (status = 200, description = "Thumbnail committed; `url` is null if it could not be resolved", body = AssetResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the asset owner"),
        (status = 404, description = "Asset not found"),
        (status = 413, description = "Upload too large"),
        (status = 415, description = "Media type not allowed"),
        (status = 503, description = "Object storage unavailable")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "uploads"
)]
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AssetResponse>, AppError> {
    upload(state, MediaKind::Thumbnail, user_id, id, headers, multipart).await
}

#[utoipa::path(
    get,
    path = "/api/thumbnails/{key}",
    params(
        ("key" = String, Path, description = "Storage key of the thumbnail")
    ),
    responses(
        (status = 200, description = "Thumbnail bytes"),
        (status = 404, description = "Not in the cache")
    ),
    tag = "uploads"
)]
pub async fn get_cached_thumbnail(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let object = state
        .thumbnail_cache
        .as_ref()
        .and_then(|cache| cache.get(&key))
        .ok_or_else(|| AppError::NotFound("Thumbnail not found".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, object.content_type)],
        Body::from(object.bytes),
    )
        .into_response())
}
