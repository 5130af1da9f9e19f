use crate::services::keys::KeyStrategy;
use crate::services::url_policy::{UrlPolicy, UrlPolicyKind};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest validity S3 accepts for a presigned URL.
const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Where thumbnails are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailBackend {
    /// Files under `ASSETS_ROOT`, served by this process.
    Disk,
    /// Process-local cache; lost on restart.
    Memory,
    /// Same object store as videos.
    ObjectStore,
}

impl FromStr for ThumbnailBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disk" => Ok(ThumbnailBackend::Disk),
            "memory" => Ok(ThumbnailBackend::Memory),
            "object_store" | "s3" => Ok(ThumbnailBackend::ObjectStore),
            other => Err(format!("unknown thumbnail backend '{}'", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,

    /// Externally reachable base of this server, used for disk and memory thumbnail URLs
    pub public_base_url: String,

    pub database_url: String,

    pub jwt_secret: String,

    /// Upload ceiling for videos in bytes (default: 1 GiB)
    pub max_video_size: u64,

    /// Upload ceiling for thumbnails in bytes (default: 10 MiB)
    pub max_thumbnail_size: u64,

    /// Directory holding staged uploads (default: OS temp dir)
    pub scratch_dir: PathBuf,

    pub ffmpeg_path: String,

    pub key_strategy: KeyStrategy,

    pub url_policy: UrlPolicyKind,

    /// Required when `url_policy` is `cdn`
    pub cdn_origin: Option<String>,

    pub presign_ttl: Duration,

    pub s3_bucket: String,
    pub s3_region: String,
    /// Custom endpoint for MinIO or LocalStack
    pub s3_endpoint: Option<String>,
    pub s3_force_path_style: bool,
    /// Static credentials; the default AWS provider chain is used when unset
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,

    pub thumbnail_backend: ThumbnailBackend,

    /// Root directory of the disk thumbnail backend (default: ./assets)
    pub assets_root: PathBuf,

    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8091,
            public_base_url: "http://localhost:8091".to_string(),
            database_url: "sqlite://tubely.db?mode=rwc".to_string(),
            jwt_secret: "secret".to_string(),
            max_video_size: 1 << 30,
            max_thumbnail_size: 10 << 20,
            scratch_dir: env::temp_dir(),
            ffmpeg_path: "ffmpeg".to_string(),
            key_strategy: KeyStrategy::Random,
            url_policy: UrlPolicyKind::Presigned,
            cdn_origin: None,
            presign_ttl: Duration::from_secs(60),
            s3_bucket: "tubely-media".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_force_path_style: false,
            s3_access_key: None,
            s3_secret_key: None,
            thumbnail_backend: ThumbnailBackend::ObjectStore,
            assets_root: PathBuf::from("./assets"),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value != "false" && value != "0"
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Builds the configuration from an arbitrary key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();

        let port = parse_or(&lookup, "PORT", default.port)?;
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let config = Self {
            port,
            public_base_url,
            database_url: lookup("DATABASE_URL").unwrap_or(default.database_url),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(default.jwt_secret),
            max_video_size: parse_or(&lookup, "MAX_VIDEO_SIZE", default.max_video_size)?,
            max_thumbnail_size: parse_or(&lookup, "MAX_THUMBNAIL_SIZE", default.max_thumbnail_size)?,
            scratch_dir: lookup("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.scratch_dir),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
            key_strategy: parse_or(&lookup, "KEY_STRATEGY", default.key_strategy)?,
            url_policy: parse_or(&lookup, "URL_POLICY", default.url_policy)?,
            cdn_origin: lookup("CDN_ORIGIN").map(|o| o.trim_end_matches('/').to_string()),
            presign_ttl: Duration::from_secs(parse_or(
                &lookup,
                "PRESIGN_TTL_SECS",
                default.presign_ttl.as_secs(),
            )?),
            s3_bucket: lookup("S3_BUCKET").unwrap_or(default.s3_bucket),
            s3_region: lookup("S3_REGION").unwrap_or(default.s3_region),
            s3_endpoint: lookup("S3_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            s3_force_path_style: lookup("S3_FORCE_PATH_STYLE")
                .map(|v| flag(&v))
                .unwrap_or(default.s3_force_path_style),
            s3_access_key: lookup("S3_ACCESS_KEY"),
            s3_secret_key: lookup("S3_SECRET_KEY"),
            thumbnail_backend: parse_or(&lookup, "THUMBNAIL_BACKEND", default.thumbnail_backend)?,
            assets_root: lookup("ASSETS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.assets_root),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),
        };

        config.validate()?;
        Ok(config)
    }

    /// Local setup: disk thumbnails, stable keys, direct URLs against a MinIO endpoint.
    pub fn development() -> Self {
        Self {
            key_strategy: KeyStrategy::Identity,
            url_policy: UrlPolicyKind::Direct,
            s3_endpoint: Some("http://localhost:9000".to_string()),
            s3_force_path_style: true,
            thumbnail_backend: ThumbnailBackend::Disk,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url_policy == UrlPolicyKind::Cdn && self.cdn_origin.is_none() {
            return Err(ConfigError::Missing("CDN_ORIGIN"));
        }
        if self.s3_bucket.is_empty() {
            return Err(ConfigError::Missing("S3_BUCKET"));
        }
        if self.presign_ttl.is_zero() || self.presign_ttl > MAX_PRESIGN_TTL {
            return Err(ConfigError::Invalid {
                key: "PRESIGN_TTL_SECS",
                value: self.presign_ttl.as_secs().to_string(),
                reason: "must be between 1 second and 7 days".to_string(),
            });
        }
        for (key, size) in [
            ("MAX_VIDEO_SIZE", self.max_video_size),
            ("MAX_THUMBNAIL_SIZE", self.max_thumbnail_size),
        ] {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Public base of the bucket for direct URLs.
    pub fn s3_public_base(&self) -> String {
        match &self.s3_endpoint {
            Some(endpoint) => format!("{}/{}", endpoint, self.s3_bucket),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.s3_bucket, self.s3_region
            ),
        }
    }

    pub fn video_url_policy(&self) -> UrlPolicy {
        match self.url_policy {
            UrlPolicyKind::Direct => UrlPolicy::Direct {
                base_url: self.s3_public_base(),
            },
            UrlPolicyKind::Cdn => UrlPolicy::Cdn {
                origin: self.cdn_origin.clone().unwrap_or_default(),
            },
            UrlPolicyKind::Presigned => UrlPolicy::Presigned {
                bucket: self.s3_bucket.clone(),
                ttl: self.presign_ttl,
            },
        }
    }

    /// Disk and memory backends cannot presign, so they always serve direct URLs.
    pub fn thumbnail_url_policy(&self) -> UrlPolicy {
        match self.thumbnail_backend {
            ThumbnailBackend::Disk => UrlPolicy::Direct {
                base_url: format!("{}/assets", self.public_base_url),
            },
            ThumbnailBackend::Memory => UrlPolicy::Direct {
                base_url: format!("{}/api/thumbnails", self.public_base_url),
            },
            ThumbnailBackend::ObjectStore => self.video_url_policy(),
        }
    }
}
