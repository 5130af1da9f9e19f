use crate::services::keys::StorageKey;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Object storage seen by the upload pipeline.
///
/// `put_object` either commits the whole file under `key` or fails; callers
/// never observe a partial object.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams the file at `body` to `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &StorageKey,
        body: &Path,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Time-limited GET URL for `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Bucket (or logical namespace) the objects are written to.
    fn bucket(&self) -> &str;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn put_object(
        &self,
        key: &StorageKey,
        body: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let stream = ByteStream::from_path(body)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to open {}: {}", body.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(content_type)
            .body(stream)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        debug!(bucket = %self.bucket, key = %key, "Object stored");
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Backend(format!("invalid presign ttl: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
