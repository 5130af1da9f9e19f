use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// The kind of media an asset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    /// A still image (jpeg or png) shown in place of the video.
    Thumbnail,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Thumbnail => "thumbnail",
        }
    }

    /// Object-store prefix under which keys of this kind are placed.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Thumbnail => "thumbnails",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaKind::Video),
            "thumbnail" => Ok(MediaKind::Thumbnail),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Where the committed bytes of an asset live.
///
/// Persisted as a tagged JSON value and turned into a user-facing URL at read
/// time by [`crate::services::url_policy::UrlPolicy::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Locator {
    Direct { url: String },
    Cdn { url: String },
    BucketKey { bucket: String, key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub description: Option<String>,
    /// Only set once the bytes it points at have been committed.
    pub locator: Option<Locator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(owner_id: Uuid, kind: MediaKind, title: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            title,
            description,
            locator: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssetResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub title: String,
    pub description: Option<String>,
    /// Retrieval URL, freshly signed when the deployment uses presigned URLs.
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetResponse {
    pub fn new(asset: &Asset, url: Option<String>) -> Self {
        Self {
            id: asset.id,
            owner_id: asset.owner_id,
            kind: asset.kind,
            title: asset.title.clone(),
            description: asset.description.clone(),
            url,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_is_tagged_json() {
        let locator = Locator::BucketKey {
            bucket: "tubely-media".to_string(),
            key: "videos/abc.mp4".to_string(),
        };
        let json = serde_json::to_value(&locator).unwrap();
        assert_eq!(json["type"], "bucket_key");
        assert_eq!(json["bucket"], "tubely-media");
        assert_eq!(json["key"], "videos/abc.mp4");

        let back: Locator = serde_json::from_value(json).unwrap();
        assert_eq!(back, locator);
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert_eq!("thumbnail".parse::<MediaKind>().unwrap(), MediaKind::Thumbnail);
        assert!("audio".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_new_asset_has_no_locator() {
        let asset = Asset::new(Uuid::new_v4(), MediaKind::Video, "Boots".to_string(), None);
        assert!(asset.locator.is_none());
        assert_eq!(asset.created_at, asset.updated_at);
    }
}
