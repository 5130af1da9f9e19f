use crate::models::Locator;
use crate::services::keys::StorageKey;
use crate::services::storage::{StorageError, StorageService};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::str::FromStr;
use std::time::Duration;

/// Unreserved characters (RFC 3986) stay literal inside a key segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPolicyKind {
    Direct,
    Cdn,
    Presigned,
}

impl FromStr for UrlPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(UrlPolicyKind::Direct),
            "cdn" => Ok(UrlPolicyKind::Cdn),
            "presigned" => Ok(UrlPolicyKind::Presigned),
            other => Err(format!("unknown url policy '{}'", other)),
        }
    }
}

/// Decides what gets persisted after a commit and how it becomes a URL on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPolicy {
    /// Public URL built from a fixed base.
    Direct { base_url: String },
    /// URL under a CDN origin fronting the bucket.
    Cdn { origin: String },
    /// Store `(bucket, key)` and sign a fresh URL on every read.
    Presigned { bucket: String, ttl: Duration },
}

impl UrlPolicy {
    pub fn kind(&self) -> UrlPolicyKind {
        match self {
            UrlPolicy::Direct { .. } => UrlPolicyKind::Direct,
            UrlPolicy::Cdn { .. } => UrlPolicyKind::Cdn,
            UrlPolicy::Presigned { .. } => UrlPolicyKind::Presigned,
        }
    }

    pub fn locator_for(&self, key: &StorageKey) -> Locator {
        match self {
            UrlPolicy::Direct { base_url } => Locator::Direct {
                url: join_url(base_url, key.as_str()),
            },
            UrlPolicy::Cdn { origin } => Locator::Cdn {
                url: join_url(origin, key.as_str()),
            },
            UrlPolicy::Presigned { bucket, .. } => Locator::BucketKey {
                bucket: bucket.clone(),
                key: key.as_str().to_string(),
            },
        }
    }

    /// User-facing URL for a persisted locator.
    ///
    /// Direct and CDN locators are returned as stored, even if the deployment
    /// has since switched policy. Bucket/key locators are signed on every call.
    pub async fn resolve(
        &self,
        locator: &Locator,
        store: &dyn StorageService,
    ) -> Result<String, StorageError> {
        match locator {
            Locator::Direct { url } | Locator::Cdn { url } => Ok(url.clone()),
            Locator::BucketKey { bucket, key } => {
                if bucket != store.bucket() {
                    return Err(StorageError::Backend(format!(
                        "locator bucket '{}' is not served by '{}'",
                        bucket,
                        store.bucket()
                    )));
                }
                let ttl = match self {
                    UrlPolicy::Presigned { ttl, .. } => *ttl,
                    _ => DEFAULT_PRESIGN_TTL,
                };
                store.presign_get(key, ttl).await
            }
        }
    }
}

/// `{base}/{key}` with each key segment percent-encoded.
pub fn join_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SigningStore {
        calls: Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl StorageService for SigningStore {
        async fn put_object(&self, _: &StorageKey, _: &Path, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((key.to_string(), ttl));
            Ok(format!("https://signed.example/{}?sig={}", key, calls.len()))
        }

        fn bucket(&self) -> &str {
            "tubely-media"
        }
    }

    #[test]
    fn test_direct_locator() {
        let policy = UrlPolicy::Direct {
            base_url: "https://tubely-media.s3.us-east-1.amazonaws.com/".to_string(),
        };
        let locator = policy.locator_for(&StorageKey::new("videos/abc.mp4"));
        assert_eq!(
            locator,
            Locator::Direct {
                url: "https://tubely-media.s3.us-east-1.amazonaws.com/videos/abc.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_cdn_locator_encodes_segments() {
        let policy = UrlPolicy::Cdn {
            origin: "https://d111.cloudfront.net".to_string(),
        };
        let locator = policy.locator_for(&StorageKey::new("videos/a b+c.mp4"));
        assert_eq!(
            locator,
            Locator::Cdn {
                url: "https://d111.cloudfront.net/videos/a%20b%2Bc.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_presigned_locator_stores_bucket_and_key() {
        let policy = UrlPolicy::Presigned {
            bucket: "tubely-media".to_string(),
            ttl: Duration::from_secs(60),
        };
        let locator = policy.locator_for(&StorageKey::new("videos/abc.mp4"));
        assert_eq!(
            locator,
            Locator::BucketKey {
                bucket: "tubely-media".to_string(),
                key: "videos/abc.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_presigned_resolve_signs_fresh_each_read() {
        let store = SigningStore::default();
        let policy = UrlPolicy::Presigned {
            bucket: "tubely-media".to_string(),
            ttl: Duration::from_secs(300),
        };
        let locator = policy.locator_for(&StorageKey::new("videos/abc.mp4"));

        let first = policy.resolve(&locator, &store).await.unwrap();
        let second = policy.resolve(&locator, &store).await.unwrap();

        assert_ne!(first, second);
        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(k, ttl)| k == "videos/abc.mp4" && *ttl == Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_stored_direct_url_is_returned_verbatim() {
        let store = SigningStore::default();
        let policy = UrlPolicy::Presigned {
            bucket: "tubely-media".to_string(),
            ttl: Duration::from_secs(60),
        };
        let locator = Locator::Direct {
            url: "http://localhost:8091/assets/thumbnails/x.png".to_string(),
        };

        let url = policy.resolve(&locator, &store).await.unwrap();
        assert_eq!(url, "http://localhost:8091/assets/thumbnails/x.png");
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_bucket_is_rejected() {
        let store = SigningStore::default();
        let policy = UrlPolicy::Presigned {
            bucket: "tubely-media".to_string(),
            ttl: Duration::from_secs(60),
        };
        let locator = Locator::BucketKey {
            bucket: "someone-else".to_string(),
            key: "videos/abc.mp4".to_string(),
        };
        assert!(policy.resolve(&locator, &store).await.is_err());
    }

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!("CDN".parse::<UrlPolicyKind>().unwrap(), UrlPolicyKind::Cdn);
        assert_eq!("presigned".parse::<UrlPolicyKind>().unwrap(), UrlPolicyKind::Presigned);
        assert!("signed".parse::<UrlPolicyKind>().is_err());
    }
}
