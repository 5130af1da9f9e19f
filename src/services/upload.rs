use crate::api::error::AppError;
use crate::models::{Asset, AssetResponse, MediaKind};
use crate::services::assets::{AssetRepository, RepositoryError};
use crate::services::keys::KeyDeriver;
use crate::services::staging::{ScratchStager, StageError};
use crate::services::storage::StorageService;
use crate::services::transcoder::Transcoder;
use crate::services::url_policy::UrlPolicy;
use crate::utils::keyed_mutex::AssetLocks;
use chrono::Utc;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What an upload of one media kind accepts and how it is processed.
#[derive(Debug, Clone)]
pub struct MediaPolicy {
    pub kind: MediaKind,
    /// Multipart field carrying the file.
    pub field_name: &'static str,
    pub allowed_types: &'static [&'static str],
    pub max_bytes: u64,
    pub transcode: bool,
}

impl MediaPolicy {
    pub fn video(max_bytes: u64) -> Self {
        Self {
            kind: MediaKind::Video,
            field_name: "video",
            allowed_types: &["video/mp4"],
            max_bytes,
            transcode: true,
        }
    }

    pub fn thumbnail(max_bytes: u64) -> Self {
        Self {
            kind: MediaKind::Thumbnail,
            field_name: "thumbnail",
            allowed_types: &["image/jpeg", "image/png"],
            max_bytes,
            transcode: false,
        }
    }

    /// File extension for an allowed media type.
    pub fn extension_for(&self, media_type: &str) -> Option<&'static str> {
        if !self.allowed_types.contains(&media_type) {
            return None;
        }
        match media_type {
            "video/mp4" => Some("mp4"),
            "image/jpeg" => Some("jpeg"),
            "image/png" => Some("png"),
            _ => None,
        }
    }

    pub fn check_declared_size(&self, declared: Option<u64>) -> Result<(), AppError> {
        match declared {
            Some(len) if len > self.max_bytes => Err(AppError::PayloadTooLarge(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                len, self.max_bytes
            ))),
            _ => Ok(()),
        }
    }

    /// Parses a part's `Content-Type` into its bare `type/subtype`.
    pub fn parse_media_type(&self, raw: Option<&str>) -> Result<String, AppError> {
        let raw = raw
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(format!("Missing Content-Type for {}", self.field_name))
            })?;
        let parsed: mime::Mime = raw
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid Content-Type '{}'", raw)))?;
        Ok(parsed.essence_str().to_ascii_lowercase())
    }

    /// Returns the extension for `media_type`, or rejects it.
    pub fn check_media_type(&self, media_type: &str) -> Result<&'static str, AppError> {
        self.extension_for(media_type).ok_or_else(|| {
            AppError::UnsupportedMediaType(format!(
                "{} uploads accept {}, got {}",
                self.kind,
                self.allowed_types.join(", "),
                media_type
            ))
        })
    }
}

/// The deployment's choices for one media kind: where bytes go, how they
/// are named and how they are addressed.
pub struct Pipeline {
    pub policy: MediaPolicy,
    pub keys: Arc<dyn KeyDeriver>,
    pub store: Arc<dyn StorageService>,
    pub urls: UrlPolicy,
}

pub struct UploadRequest<R> {
    pub asset_id: Uuid,
    pub identity: Uuid,
    /// Length of the file itself, when the caller knows it up front.
    pub declared_len: Option<u64>,
    /// `Content-Type` of the file part.
    pub content_type: Option<String>,
    pub body: R,
}

/// Drives stage, transcode, commit and metadata update for uploads.
pub struct UploadService {
    assets: Arc<dyn AssetRepository>,
    stager: ScratchStager,
    transcoder: Arc<dyn Transcoder>,
    video: Pipeline,
    thumbnail: Pipeline,
    locks: AssetLocks,
}

impl UploadService {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        stager: ScratchStager,
        transcoder: Arc<dyn Transcoder>,
        video: Pipeline,
        thumbnail: Pipeline,
    ) -> Self {
        Self {
            assets,
            stager,
            transcoder,
            video,
            thumbnail,
            locks: AssetLocks::new(),
        }
    }

    pub fn pipeline(&self, kind: MediaKind) -> &Pipeline {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Thumbnail => &self.thumbnail,
        }
    }

    pub fn policy(&self, kind: MediaKind) -> &MediaPolicy {
        &self.pipeline(kind).policy
    }

    pub async fn upload_video<R>(&self, req: UploadRequest<R>) -> Result<Asset, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.upload(&self.video, req).await
    }

    pub async fn upload_thumbnail<R>(&self, req: UploadRequest<R>) -> Result<Asset, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.upload(&self.thumbnail, req).await
    }

    /// Builds the response for an asset, signing a fresh URL when its
    /// locator is a bucket/key pair.
    pub async fn resolve(&self, asset: &Asset) -> Result<AssetResponse, AppError> {
        let url = match &asset.locator {
            Some(locator) => {
                let pipeline = self.pipeline(asset.kind);
                let url = pipeline
                    .urls
                    .resolve(locator, pipeline.store.as_ref())
                    .await
                    .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
                Some(url)
            }
            None => None,
        };
        Ok(AssetResponse::new(asset, url))
    }

    async fn upload<R>(&self, pipeline: &Pipeline, req: UploadRequest<R>) -> Result<Asset, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let policy = &pipeline.policy;
        let asset_id = req.asset_id;

        policy.check_declared_size(req.declared_len)?;
        let media_type = policy.parse_media_type(req.content_type.as_deref())?;

        let _lock = self.locks.lock(asset_id).await;

        let mut asset = match self.assets.get(asset_id).await {
            Ok(asset) => asset,
            Err(RepositoryError::NotFound(_)) => {
                return Err(AppError::NotFound(format!("Asset {} not found", asset_id)));
            }
            Err(e) => return Err(AppError::Internal(format!("Error loading asset: {}", e))),
        };

        if asset.owner_id != req.identity {
            warn!(asset_id = %asset_id, user_id = %req.identity, "Upload by non-owner rejected");
            return Err(AppError::Forbidden(
                "User is not the asset owner".to_string(),
            ));
        }
        if asset.kind != policy.kind {
            return Err(AppError::BadRequest(format!(
                "Asset {} holds a {}, not a {}",
                asset_id, asset.kind, policy.kind
            )));
        }

        let ext = policy.check_media_type(&media_type)?;

        info!(asset_id = %asset_id, media_type = %media_type, "Staging {} upload", policy.kind);
        let mut staged = self
            .stager
            .stage(req.body, &media_type, ext, policy.max_bytes)
            .await
            .map_err(stage_error)?;

        if policy.transcode {
            info!(asset_id = %asset_id, size = staged.size_bytes(), "Transcoding for fast start");
            let rewritten = self
                .transcoder
                .rewrite(staged.path())
                .await
                .map_err(|e| AppError::ProcessingFailed(e.to_string()))?;
            staged.adopt_rewrite(rewritten);
        }

        let key = pipeline.keys.derive_key(&asset, ext);

        pipeline
            .store
            .put_object(&key, staged.path(), staged.declared_media_type())
            .await
            .map_err(|e| {
                error!(asset_id = %asset_id, key = %key, "Commit failed: {}", e);
                AppError::StorageUnavailable(e.to_string())
            })?;
        info!(asset_id = %asset_id, key = %key, size = staged.size_bytes(), "Object committed");

        asset.locator = Some(pipeline.urls.locator_for(&key));
        asset.updated_at = Utc::now();

        if let Err(e) = self.assets.update(&asset).await {
            error!(
                asset_id = %asset_id,
                bucket = %pipeline.store.bucket(),
                key = %key,
                "Orphaned object: committed but asset metadata not updated: {}",
                e
            );
            return Err(AppError::MetadataUpdateFailed(e.to_string()));
        }
        info!(asset_id = %asset_id, "Asset metadata updated");

        if let Err(e) = staged.release() {
            warn!(asset_id = %asset_id, "Failed to remove scratch files: {}", e);
        }

        Ok(asset)
    }
}

fn stage_error(e: StageError) -> AppError {
    match e {
        StageError::TooLarge { limit } => {
            AppError::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
        }
        StageError::Read(e) => AppError::BadRequest(format!("Unable to read upload: {}", e)),
        e @ (StageError::Create(_) | StageError::Write(_)) => AppError::Internal(e.to_string()),
    }
}
