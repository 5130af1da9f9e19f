use crate::services::keys::StorageKey;
use crate::services::storage::{StorageError, StorageService};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Stores objects as files under a root directory served at `/assets`.
pub struct DiskStorageService {
    root: PathBuf,
}

impl DiskStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key to a path under the root, refusing anything that could escape it.
    fn path_for(&self, key: &StorageKey) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.as_str());
        if key.as_str().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::Backend(format!("invalid object key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageService for DiskStorageService {
    async fn put_object(
        &self,
        key: &StorageKey,
        body: &Path,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let target = self.path_for(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy beside the target, then rename so readers never see a partial file.
        let mut partial = target.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        if let Err(e) = tokio::fs::copy(body, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(path = %target.display(), "Object written to disk");
        Ok(())
    }

    async fn presign_get(&self, _key: &str, _ttl: Duration) -> Result<String, StorageError> {
        Err(StorageError::Unsupported("presigned URLs on local disk"))
    }

    fn bucket(&self) -> &str {
        "local"
    }
}

#[derive(Debug, Clone)]
pub struct CachedObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Process-local object cache. Contents are lost on restart.
///
/// Holds at most one object per asset: committing a new key for an asset
/// evicts the one it replaces.
#[derive(Default)]
pub struct MemoryStorageService {
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    objects: HashMap<String, CachedObject>,
    by_asset: HashMap<Uuid, String>,
}

impl MemoryStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedObject> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.objects.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageService for MemoryStorageService {
    async fn put_object(
        &self,
        key: &StorageKey,
        body: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(body).await?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::Backend("memory cache lock poisoned".to_string()))?;
        state.objects.insert(
            key.as_str().to_string(),
            CachedObject {
                bytes: Bytes::from(bytes),
                content_type: content_type.to_string(),
            },
        );

        if let Some(asset_id) = key.asset_id() {
            let previous = state.by_asset.insert(asset_id, key.as_str().to_string());
            if let Some(previous) = previous.filter(|p| p != key.as_str()) {
                state.objects.remove(&previous);
                debug!(asset_id = %asset_id, evicted = %previous, "Replaced cached object");
            }
        }
        Ok(())
    }

    async fn presign_get(&self, _key: &str, _ttl: Duration) -> Result<String, StorageError> {
        Err(StorageError::Unsupported("presigned URLs on the memory cache"))
    }

    fn bucket(&self) -> &str {
        "memory"
    }
}
