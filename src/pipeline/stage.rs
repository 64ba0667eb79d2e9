//! Staging: make a card image fetchable by the VLM for a bounded time.
//!
//! Each `stage` creates exactly one object in the backing store, and each
//! object must be deleted once its card has been recognised, whatever the
//! outcome. [`Stager::acquire`] returns a [`StagedGuard`] that enforces this:
//! call [`StagedGuard::release`] on the normal path, and if the guard is
//! dropped without being released (the card's future was cancelled, or a
//! panic unwound through it) the delete is spawned onto the runtime instead.
//!
//! Revocation is best-effort. A stale object costs storage, not correctness,
//! so delete failures are logged and swallowed.

use crate::config::ScanConfig;
use crate::error::StagingError;
use crate::pipeline::encode::{prepare_jpeg, STAGED_CONTENT_TYPE};
use crate::pipeline::input::CardImage;
use crate::pipeline::store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A time-bounded URL to one staged image plus the handle needed to delete it.
///
/// Deliberately not `Clone`: one reference per staged object, consumed by
/// [`Stager::revoke`].
#[derive(Debug)]
pub struct StagedReference {
    url: String,
    object_id: String,
    ttl: Duration,
}

impl StagedReference {
    /// URL the recognition service should fetch.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Store-specific id used for revocation.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// How long `url` stays valid after staging.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Prepares, uploads and revokes card images.
#[derive(Clone)]
pub struct Stager {
    store: Arc<dyn ObjectStore>,
    ttl: Duration,
    timeout: Duration,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl Stager {
    pub fn new(store: Arc<dyn ObjectStore>, config: &ScanConfig) -> Self {
        Self {
            store,
            ttl: config.staging_ttl(),
            timeout: config.stage_timeout(),
            max_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Upload `image` and return a reference to it.
    ///
    /// Each of upload and presign is bounded by the staging timeout. If the
    /// upload succeeded but presigning did not, the object is deleted before
    /// the error is returned, so a failed `stage` never leaves an object
    /// behind that the caller has no handle for.
    pub async fn stage(&self, image: &CardImage) -> Result<StagedReference, StagingError> {
        let card = image.clone();
        let (max_dim, quality) = (self.max_dimension, self.jpeg_quality);
        let jpeg = tokio::task::spawn_blocking(move || prepare_jpeg(&card, max_dim, quality))
            .await
            .map_err(|e| StagingError::Encode(format!("encoder task failed: {e}")))??;

        let secs = self.timeout.as_secs();
        let object_id = timeout(self.timeout, self.store.put(jpeg, STAGED_CONTENT_TYPE))
            .await
            .map_err(|_| StagingError::Timeout { secs })?
            .map_err(|e| StagingError::Upload(e.to_string()))?;
        debug!(
            "Staged {} as {} in {} store",
            image.filename,
            object_id,
            self.store.name()
        );

        let presigned = match timeout(self.timeout, self.store.presigned_get(&object_id, self.ttl)).await {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(e)) => Err(StagingError::Presign {
                object_id: object_id.clone(),
                detail: e.to_string(),
            }),
            Err(_) => Err(StagingError::Timeout { secs }),
        };

        match presigned {
            Ok(url) => Ok(StagedReference {
                url,
                object_id,
                ttl: self.ttl,
            }),
            Err(e) => {
                delete_best_effort(self.store.as_ref(), &object_id).await;
                Err(e)
            }
        }
    }

    /// Delete the staged object. Never fails; errors are logged.
    pub async fn revoke(&self, reference: StagedReference) {
        delete_best_effort(self.store.as_ref(), &reference.object_id).await;
    }

    /// Stage `image` and wrap the reference in a guard that revokes it.
    pub async fn acquire(&self, image: &CardImage) -> Result<StagedGuard, StagingError> {
        let reference = self.stage(image).await?;
        Ok(StagedGuard {
            store: Arc::clone(&self.store),
            reference,
            released: false,
        })
    }
}

async fn delete_best_effort(store: &dyn ObjectStore, object_id: &str) {
    match store.delete(object_id).await {
        Ok(()) => debug!("Revoked staged object {}", object_id),
        Err(e) => warn!(
            "Failed to delete staged object {} from {} store: {}",
            object_id,
            store.name(),
            e
        ),
    }
}

/// Scoped ownership of one [`StagedReference`].
pub struct StagedGuard {
    store: Arc<dyn ObjectStore>,
    reference: StagedReference,
    released: bool,
}

impl StagedGuard {
    pub fn reference(&self) -> &StagedReference {
        &self.reference
    }

    /// Revoke the reference and wait for the delete to finish.
    pub async fn release(mut self) {
        self.released = true;
        let object_id = std::mem::take(&mut self.reference.object_id);
        delete_best_effort(self.store.as_ref(), &object_id).await;
    }
}

impl Drop for StagedGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let object_id = std::mem::take(&mut self.reference.object_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    "Staged object {} dropped without release, revoking in background",
                    object_id
                );
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    delete_best_effort(store.as_ref(), &object_id).await;
                });
            }
            Err(_) => warn!(
                "Staged object {} leaked: dropped outside a tokio runtime",
                object_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::store::{MemoryObjectStore, StoreError};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn card() -> CardImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 200, 200])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        CardImage::from_bytes("card.png", bytes).unwrap()
    }

    /// Store whose presign and delete can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryObjectStore,
        fail_presign: bool,
        fail_delete: bool,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StoreError> {
            self.inner.put(bytes, content_type).await
        }

        async fn presigned_get(&self, id: &str, ttl: Duration) -> Result<String, StoreError> {
            if self.fail_presign {
                return Err(StoreError("signing key unavailable".into()));
            }
            self.inner.presigned_get(id, ttl).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                return Err(StoreError("bucket unreachable".into()));
            }
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn stage_then_revoke_leaves_store_empty() {
        let store = Arc::new(MemoryObjectStore::new());
        let stager = Stager::new(store.clone(), &ScanConfig::default());

        let reference = stager.stage(&card()).await.unwrap();
        assert!(reference.url().starts_with("data:image/jpeg;base64,"));
        assert_eq!(reference.ttl(), Duration::from_secs(36_000));
        assert_eq!(store.len(), 1);

        stager.revoke(reference).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn presign_failure_deletes_uploaded_object() {
        let store = Arc::new(FlakyStore {
            fail_presign: true,
            ..Default::default()
        });
        let stager = Stager::new(store.clone(), &ScanConfig::default());

        let err = stager.stage(&card()).await.unwrap_err();
        assert!(matches!(err, StagingError::Presign { .. }));
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn revoke_swallows_delete_errors() {
        let store = Arc::new(FlakyStore {
            fail_delete: true,
            ..Default::default()
        });
        let stager = Stager::new(store.clone(), &ScanConfig::default());
        let reference = stager.stage(&card()).await.unwrap();
        stager.revoke(reference).await;
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_guard_revokes_in_background() {
        let store = Arc::new(MemoryObjectStore::new());
        let stager = Stager::new(store.clone(), &ScanConfig::default());

        let guard = stager.acquire(&card()).await.unwrap();
        assert_eq!(store.len(), 1);
        drop(guard);

        for _ in 0..50 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn released_guard_revokes_once() {
        let store = Arc::new(FlakyStore::default());
        let stager = Stager::new(store.clone(), &ScanConfig::default());

        let guard = stager.acquire(&card()).await.unwrap();
        assert!(!guard.reference().object_id().is_empty());
        guard.release().await;
        tokio::task::yield_now().await;
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }
}
