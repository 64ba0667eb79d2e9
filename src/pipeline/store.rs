//! Backing object stores used to stage card images.
//!
//! The stager only ever needs three operations: store some bytes, get a
//! temporary URL for them, delete them. [`ObjectStore`] is exactly that trio,
//! so staging logic is identical whether the bytes land in S3 or stay in
//! process memory.
//!
//! * [`MemoryObjectStore`] keeps objects in process and hands out base64
//!   `data:` URLs. No cloud account needed; works with every provider that
//!   accepts inline images.
//! * [`S3ObjectStore`] (feature `s3`) uploads to a bucket and hands out
//!   presigned GET URLs, so requests to the VLM stay small.

use crate::pipeline::encode::data_url;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// An object-store operation failed. The message is what the store reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Minimal object-store contract consumed by [`crate::pipeline::stage::Stager`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short name for logs ("memory", "s3").
    fn name(&self) -> &str;

    /// Store `bytes` as a new object and return its id.
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError>;

    /// Produce a URL that resolves to the object for at least `ttl`.
    async fn presigned_get(&self, object_id: &str, ttl: Duration) -> Result<String, StoreError>;

    /// Remove the object.
    async fn delete(&self, object_id: &str) -> Result<(), StoreError>;
}

/// Generate a unique object key, mirroring `card_<uuid>.jpg`.
pub fn new_object_key(content_type: &str) -> String {
    let ext = match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    };
    format!("card_{}.{}", uuid::Uuid::new_v4(), ext)
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Process-local store whose URLs are `data:` URLs.
///
/// The TTL passed to `presigned_get` is ignored: a data URL carries the bytes
/// themselves and cannot expire.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError> {
        let key = new_object_key(content_type);
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError("memory store lock poisoned".into()))?;
        objects.insert(key.clone(), (bytes, content_type.to_string()));
        Ok(key)
    }

    async fn presigned_get(&self, object_id: &str, _ttl: Duration) -> Result<String, StoreError> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| StoreError("memory store lock poisoned".into()))?;
        let (bytes, content_type) = objects
            .get(object_id)
            .ok_or_else(|| StoreError(format!("no such object '{object_id}'")))?;
        Ok(data_url(bytes, content_type))
    }

    async fn delete(&self, object_id: &str) -> Result<(), StoreError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError("memory store lock poisoned".into()))?;
        objects
            .remove(object_id)
            .map(|_| ())
            .ok_or_else(|| StoreError(format!("no such object '{object_id}'")))
    }
}

// ── S3 store ─────────────────────────────────────────────────────────────

#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

#[cfg(feature = "s3")]
mod s3 {
    use super::{new_object_key, ObjectStore, StoreError};
    use crate::error::CardScanError;
    use async_trait::async_trait;
    use aws_sdk_s3::error::DisplayErrorContext;
    use aws_sdk_s3::presigning::PresigningConfig;
    use std::time::Duration;
    use tracing::debug;

    /// S3 (or S3-compatible) bucket used as the staging area.
    #[derive(Debug, Clone)]
    pub struct S3ObjectStore {
        pub bucket: String,
        pub prefix: String,
        client: aws_sdk_s3::Client,
    }

    impl S3ObjectStore {
        /// Wrap an already-configured client.
        pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
            Self {
                bucket: bucket.into(),
                prefix: prefix.into(),
                client,
            }
        }

        /// Build a client from the standard AWS environment (credentials chain,
        /// `AWS_REGION`), optionally overriding region and endpoint.
        ///
        /// A custom endpoint (MinIO, R2, …) switches to path-style addressing.
        ///
        /// # Errors
        /// [`CardScanError::StoreNotConfigured`] when `bucket` is empty or no
        /// region can be resolved.
        pub async fn from_env(
            bucket: impl Into<String>,
            prefix: impl Into<String>,
            region: Option<String>,
            endpoint_url: Option<String>,
        ) -> Result<Self, CardScanError> {
            let bucket = bucket.into();
            if bucket.trim().is_empty() {
                return Err(not_configured(
                    "no bucket given; pass --bucket or set CARDSCAN_S3_BUCKET",
                ));
            }

            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(aws_sdk_s3::config::Region::new(region));
            }
            let path_style = endpoint_url.is_some();
            if let Some(endpoint) = endpoint_url {
                loader = loader.endpoint_url(endpoint);
            }
            let shared = loader.load().await;
            if shared.region().is_none() {
                return Err(not_configured(
                    "no AWS region; pass --region or set AWS_REGION",
                ));
            }
            let conf = aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(path_style)
                .build();
            Ok(Self::new(aws_sdk_s3::Client::from_conf(conf), bucket, prefix))
        }

        pub fn key_for(&self, leaf: &str) -> String {
            if self.prefix.is_empty() {
                leaf.to_string()
            } else {
                format!("{}/{}", self.prefix.trim_matches('/'), leaf)
            }
        }

        fn remote_error(&self, operation: &str, key: &str, message: String) -> StoreError {
            let lower = message.to_ascii_lowercase();
            let hint = if lower.contains("credential")
                || lower.contains("accessdenied")
                || lower.contains("signature")
                || lower.contains("forbidden")
            {
                " (check AWS credentials and bucket policy)"
            } else {
                ""
            };
            StoreError(format!(
                "{operation} s3://{}/{key} failed: {message}{hint}",
                self.bucket
            ))
        }
    }

    fn not_configured(hint: &str) -> CardScanError {
        CardScanError::StoreNotConfigured {
            store: "s3".to_string(),
            hint: hint.to_string(),
        }
    }

    #[async_trait]
    impl ObjectStore for S3ObjectStore {
        fn name(&self) -> &str {
            "s3"
        }

        async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError> {
            let key = self.key_for(&new_object_key(content_type));
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .content_type(content_type)
                .body(bytes.into())
                .send()
                .await
                .map_err(|e| self.remote_error("uploading", &key, DisplayErrorContext(&e).to_string()))?;
            debug!("Uploaded s3://{}/{}", self.bucket, key);
            Ok(key)
        }

        async fn presigned_get(&self, object_id: &str, ttl: Duration) -> Result<String, StoreError> {
            let presign = PresigningConfig::expires_in(ttl)
                .map_err(|e| StoreError(format!("invalid presign TTL {ttl:?}: {e}")))?;
            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(object_id)
                .presigned(presign)
                .await
                .map_err(|e| {
                    self.remote_error("presigning", object_id, DisplayErrorContext(&e).to_string())
                })?;
            Ok(request.uri().to_string())
        }

        async fn delete(&self, object_id: &str) -> Result<(), StoreError> {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(object_id)
                .send()
                .await
                .map_err(|e| {
                    self.remote_error("deleting", object_id, DisplayErrorContext(&e).to_string())
                })?;
            debug!("Deleted s3://{}/{}", self.bucket, object_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_are_unique_and_typed() {
        let a = new_object_key("image/jpeg");
        let b = new_object_key("image/jpeg");
        assert_ne!(a, b);
        assert!(a.starts_with("card_") && a.ends_with(".jpg"));
        assert!(new_object_key("image/png").ends_with(".png"));
    }

    #[tokio::test]
    async fn memory_store_put_presign_delete() {
        let store = MemoryObjectStore::new();
        let id = store.put(vec![1, 2, 3], "image/jpeg").await.unwrap();
        assert_eq!(store.len(), 1);

        let url = store
            .presigned_get(&id, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "data:image/jpeg;base64,AQID");

        store.delete(&id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_store_reports_missing_objects() {
        let store = MemoryObjectStore::new();
        let err = store.delete("card_missing.jpg").await.unwrap_err();
        assert!(err.0.contains("card_missing.jpg"));
        assert!(store
            .presigned_get("card_missing.jpg", Duration::from_secs(1))
            .await
            .is_err());
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn s3_store_requires_a_bucket() {
        let err = S3ObjectStore::from_env("  ", "staging", Some("eu-west-1".into()), None)
            .await
            .unwrap_err();
        match err {
            crate::error::CardScanError::StoreNotConfigured { store, hint } => {
                assert_eq!(store, "s3");
                assert!(hint.contains("--bucket"), "got: {hint}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn s3_store_builds_with_explicit_region() {
        let store = S3ObjectStore::from_env(
            "cards",
            "/staging/",
            Some("eu-west-1".into()),
            Some("http://localhost:9000".into()),
        )
        .await
        .unwrap();
        assert_eq!(store.name(), "s3");
        assert_eq!(store.key_for("card_1.jpg"), "staging/card_1.jpg");
    }
}
