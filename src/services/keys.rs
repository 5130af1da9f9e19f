use crate::models::Asset;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Name of an object in the backing store, and the asset it was derived for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    key: String,
    asset_id: Option<Uuid>,
}

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            asset_id: None,
        }
    }

    pub fn for_asset(asset_id: Uuid, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            asset_id: Some(asset_id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn asset_id(&self) -> Option<Uuid> {
        self.asset_id
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// How storage keys are chosen. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `{prefix}/{asset_id}.{ext}`: re-uploads overwrite the same object.
    Identity,
    /// `{prefix}/{random}.{ext}`: every upload gets a fresh object; old ones are orphaned.
    Random,
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" => Ok(KeyStrategy::Identity),
            "random" => Ok(KeyStrategy::Random),
            other => Err(format!("unknown key strategy '{}'", other)),
        }
    }
}

pub trait KeyDeriver: Send + Sync {
    fn derive_key(&self, asset: &Asset, ext: &str) -> StorageKey;
}

pub struct IdentityKeyDeriver;

impl KeyDeriver for IdentityKeyDeriver {
    fn derive_key(&self, asset: &Asset, ext: &str) -> StorageKey {
        StorageKey::for_asset(
            asset.id,
            format!("{}/{}.{}", asset.kind.key_prefix(), asset.id, ext),
        )
    }
}

pub struct RandomKeyDeriver;

impl KeyDeriver for RandomKeyDeriver {
    fn derive_key(&self, asset: &Asset, ext: &str) -> StorageKey {
        StorageKey::for_asset(
            asset.id,
            format!("{}/{}.{}", asset.kind.key_prefix(), random_token(), ext),
        )
    }
}

/// 32 bytes from the OS CSPRNG, URL-safe base64 without padding (43 chars).
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn key_deriver(strategy: KeyStrategy) -> Arc<dyn KeyDeriver> {
    match strategy {
        KeyStrategy::Identity => Arc::new(IdentityKeyDeriver),
        KeyStrategy::Random => Arc::new(RandomKeyDeriver),
    }
}
