use crate::config::{AppConfig, ThumbnailBackend};
use crate::services::local_storage::{DiskStorageService, MemoryStorageService};
use crate::services::storage::{S3StorageService, StorageService};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_storage(config: &AppConfig) -> Arc<S3StorageService> {
    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        config.s3_endpoint.as_deref().unwrap_or("aws"),
        config.s3_bucket
    );

    let mut loader = aws_config::from_env().region(Region::new(config.s3_region.clone()));
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Some(access_key), Some(secret_key)) = (&config.s3_access_key, &config.s3_secret_key) {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.s3_force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    ensure_bucket(&s3_client, &config.s3_bucket).await;

    Arc::new(S3StorageService::new(s3_client, config.s3_bucket.clone()))
}

/// Creates the bucket when it is missing. Failures are logged; uploads will
/// surface them as storage errors.
async fn ensure_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return;
    }
    match client.create_bucket().bucket(bucket).send().await {
        Ok(_) => info!("🪣 Created bucket '{}'", bucket),
        Err(e) => warn!("Bucket '{}' not reachable: {}", bucket, DisplayErrorContext(&e)),
    }
}

/// Thumbnail commit target, plus the cache handle when thumbnails live in memory.
pub struct ThumbnailStore {
    pub store: Arc<dyn StorageService>,
    pub cache: Option<Arc<MemoryStorageService>>,
}

pub async fn setup_thumbnail_store(
    config: &AppConfig,
    object_store: Arc<S3StorageService>,
) -> anyhow::Result<ThumbnailStore> {
    let thumbnails = match config.thumbnail_backend {
        ThumbnailBackend::Disk => {
            tokio::fs::create_dir_all(&config.assets_root).await?;
            info!("🖼️  Thumbnails on disk: {}", config.assets_root.display());
            ThumbnailStore {
                store: Arc::new(DiskStorageService::new(&config.assets_root)),
                cache: None,
            }
        }
        ThumbnailBackend::Memory => {
            warn!("🖼️  Thumbnails in process memory; they are lost on restart");
            let cache = Arc::new(MemoryStorageService::new());
            ThumbnailStore {
                store: cache.clone(),
                cache: Some(cache),
            }
        }
        ThumbnailBackend::ObjectStore => {
            info!("🖼️  Thumbnails in bucket '{}'", config.s3_bucket);
            ThumbnailStore {
                store: object_store,
                cache: None,
            }
        }
    };
    Ok(thumbnails)
}
