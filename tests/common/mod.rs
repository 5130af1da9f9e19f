#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::{TempDir, TempPath};
use tokio::io::{AsyncRead, ReadBuf};
use tubely::models::{Asset, MediaKind};
use tubely::services::assets::{AssetRepository, RepositoryError};
use tubely::services::keys::{KeyStrategy, StorageKey, key_deriver};
use tubely::services::staging::ScratchStager;
use tubely::services::storage::{StorageError, StorageService};
use tubely::services::transcoder::{TranscodeError, Transcoder};
use tubely::services::upload::{MediaPolicy, Pipeline, UploadRequest, UploadService};
use tubely::services::url_policy::UrlPolicy;
use uuid::Uuid;

pub const BUCKET: &str = "tubely-media";
pub const VIDEO_LIMIT: u64 = 64 * 1024 * 1024;
pub const THUMBNAIL_LIMIT: u64 = 1024 * 1024;
/// Prefix the fake transcoder puts in front of the staged bytes.
pub const FASTSTART_MARKER: &[u8] = b"moov";

#[derive(Debug, Clone)]
pub struct PutRecord {
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Records every commit; commits and signing can be told to fail.
#[derive(Default)]
pub struct SpyStore {
    pub puts: Mutex<Vec<PutRecord>>,
    pub fail: AtomicBool,
    pub fail_presign: AtomicBool,
}

impl SpyStore {
    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn object(&self, key: &str) -> Option<PutRecord> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.key == key)
            .cloned()
    }
}

#[async_trait]
impl StorageService for SpyStore {
    async fn put_object(
        &self,
        key: &StorageKey,
        body: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection refused".to_string()));
        }
        let bytes = tokio::fs::read(body).await?;
        self.puts.lock().unwrap().push(PutRecord {
            key: key.as_str().to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("credentials expired".to_string()));
        }
        Ok(format!(
            "https://signed.test/{}/{}?expires={}",
            BUCKET,
            key,
            ttl.as_secs()
        ))
    }

    fn bucket(&self) -> &str {
        BUCKET
    }
}

/// In-memory repository counting writes; reads and updates can be made to fail.
#[derive(Default)]
pub struct SpyRepository {
    pub assets: Mutex<HashMap<Uuid, Asset>>,
    pub updates: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_update: AtomicBool,
}

impl SpyRepository {
    pub fn insert(&self, asset: Asset) {
        self.assets.lock().unwrap().insert(asset.id, asset);
    }

    pub fn snapshot(&self, id: Uuid) -> Asset {
        self.assets.lock().unwrap().get(&id).cloned().unwrap()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetRepository for SpyRepository {
    async fn create(&self, asset: &Asset) -> Result<(), RepositoryError> {
        self.insert(asset.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Asset, RepositoryError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                "database is locked".to_string(),
            )));
        }
        self.assets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update(&self, asset: &Asset) -> Result<(), RepositoryError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                "database is locked".to_string(),
            )));
        }
        let mut assets = self.assets.lock().unwrap();
        if !assets.contains_key(&asset.id) {
            return Err(RepositoryError::NotFound(asset.id));
        }
        assets.insert(asset.id, asset.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Asset>, RepositoryError> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Writes `moov` followed by the input to `{input}.processing`.
#[derive(Default)]
pub struct FakeTranscoder {
    pub calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn rewrite(&self, path: &Path) -> Result<TempPath, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut output = path.as_os_str().to_owned();
        output.push(".processing");
        let output = TempPath::from_path(PathBuf::from(output));

        let mut bytes = FASTSTART_MARKER.to_vec();
        bytes.extend(tokio::fs::read(path).await.map_err(|source| TranscodeError::Spawn {
            binary: "fake".to_string(),
            source,
        })?);
        tokio::fs::write(&output, bytes)
            .await
            .map_err(|source| TranscodeError::Spawn {
                binary: "fake".to_string(),
                source,
            })?;
        Ok(output)
    }
}

pub struct FailingTranscoder;

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn rewrite(&self, _path: &Path) -> Result<TempPath, TranscodeError> {
        Err(TranscodeError::Failed {
            binary: "ffmpeg".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "moov atom not found".to_string(),
        })
    }
}

/// Counts the bytes pulled out of the inner reader.
pub struct TrackingReader<R> {
    inner: R,
    pub read: Arc<AtomicU64>,
}

impl<R> TrackingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let read = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                read: read.clone(),
            },
            read,
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        let n = buf.filled().len() - before;
        self.read.fetch_add(n as u64, Ordering::SeqCst);
        poll
    }
}

/// Yields `good` bytes, then fails like a dropped connection.
pub struct BrokenReader {
    remaining: usize,
}

impl BrokenReader {
    pub fn new(good: usize) -> Self {
        Self { remaining: good }
    }
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        let n = self.remaining.min(buf.remaining());
        buf.put_slice(&vec![3u8; n]);
        self.remaining -= n;
        Poll::Ready(Ok(()))
    }
}

pub struct Harness {
    pub scratch: TempDir,
    pub store: Arc<SpyStore>,
    pub repo: Arc<SpyRepository>,
    pub transcoder: Arc<FakeTranscoder>,
    pub service: UploadService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(KeyStrategy::Identity, None)
    }

    pub fn with_keys(strategy: KeyStrategy) -> Self {
        Self::build(strategy, None)
    }

    pub fn with_transcoder(transcoder: Arc<dyn Transcoder>) -> Self {
        Self::build(KeyStrategy::Identity, Some(transcoder))
    }

    fn build(strategy: KeyStrategy, transcoder: Option<Arc<dyn Transcoder>>) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(SpyStore::default());
        let repo = Arc::new(SpyRepository::default());
        let fake = Arc::new(FakeTranscoder::default());
        let keys = key_deriver(strategy);
        let urls = UrlPolicy::Presigned {
            bucket: BUCKET.to_string(),
            ttl: Duration::from_secs(60),
        };

        let service = UploadService::new(
            repo.clone(),
            ScratchStager::new(scratch.path()),
            transcoder.unwrap_or_else(|| fake.clone() as Arc<dyn Transcoder>),
            Pipeline {
                policy: MediaPolicy::video(VIDEO_LIMIT),
                keys: keys.clone(),
                store: store.clone(),
                urls: urls.clone(),
            },
            Pipeline {
                policy: MediaPolicy::thumbnail(THUMBNAIL_LIMIT),
                keys,
                store: store.clone(),
                urls,
            },
        );

        Self {
            scratch,
            store,
            repo,
            transcoder: fake,
            service,
        }
    }

    /// Stores a fresh asset owned by `owner` and returns it.
    pub fn seed(&self, owner: Uuid, kind: MediaKind) -> Asset {
        let asset = Asset::new(owner, kind, "Boots".to_string(), None);
        self.repo.insert(asset.clone());
        asset
    }

    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

pub fn request<R>(asset_id: Uuid, identity: Uuid, content_type: &str, body: R) -> UploadRequest<R> {
    UploadRequest {
        asset_id,
        identity,
        declared_len: None,
        content_type: Some(content_type.to_string()),
        body,
    }
}
