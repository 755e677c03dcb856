//! ImageStore - Atomic Latest-Image Publishing
//!
//! ## Responsibilities
//!
//! - Durable image writes (temp file, fsync, atomic rename)
//! - Stable `/latest.jpg` identity for the dashboard
//! - Per-token `/uploads/<token>.jpg` identity for cache-busting clients
//!
//! A concurrent reader of the latest image never observes a partial file:
//! every publish goes through a temporary path and a single rename into
//! the canonical slot.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

const LATEST_FILE: &str = "latest.jpg";
const LATEST_TMP: &str = "latest.tmp";

/// ImageStore instance
pub struct ImageStore {
    upload_dir: PathBuf,
}

impl ImageStore {
    /// Create new ImageStore, ensuring the upload directory exists
    pub async fn new(upload_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&upload_dir).await?;
        Ok(Self { upload_dir })
    }

    /// Path of the canonical latest image
    pub fn latest_path(&self) -> PathBuf {
        self.upload_dir.join(LATEST_FILE)
    }

    /// Path of a per-token capture image
    pub fn capture_path(&self, token: &str) -> PathBuf {
        self.upload_dir.join(format!("{}.jpg", token))
    }

    /// Public URL of a per-token capture image
    pub fn capture_url(&self, token: &str) -> String {
        format!("/uploads/{}.jpg", token)
    }

    pub fn latest_exists(&self) -> bool {
        self.latest_path().exists()
    }

    /// Replace the latest image atomically (legacy token-less path).
    ///
    /// Returns the millisecond timestamp the UI uses for cache-busting.
    pub async fn publish_latest(&self, bytes: &[u8]) -> Result<i64> {
        let tmp = self.upload_dir.join(LATEST_TMP);
        Self::write_durably(&tmp, bytes).await?;
        fs::rename(&tmp, self.latest_path())
            .await
            .map_err(|e| Error::Storage(format!("latest.jpg commit failed: {}", e)))?;

        let ts = Utc::now().timestamp_millis();
        tracing::debug!(ts = ts, size = bytes.len(), "Latest image published");
        Ok(ts)
    }

    /// Publish a token-scoped capture.
    ///
    /// Commits `<token>.jpg` durably first, then swaps it into the latest
    /// slot via a hard link and a single rename. Both identities end up
    /// pointing at complete bytes; when the filesystem cannot hard-link,
    /// the latest slot gets a byte-for-byte duplicate instead.
    pub async fn publish_capture(&self, token: &str, bytes: &[u8]) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        let tmp = self.upload_dir.join(format!("tmp_{}.jpg", now));
        let token_path = self.capture_path(token);

        Self::write_durably(&tmp, bytes).await?;
        fs::rename(&tmp, &token_path)
            .await
            .map_err(|e| Error::Storage(format!("capture image commit failed: {}", e)))?;

        // Stage the latest slot next to it, then rename into place
        let latest_tmp = self.upload_dir.join(LATEST_TMP);
        match fs::remove_file(&latest_tmp).await {
            Ok(()) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Storage(format!("stale temp cleanup failed: {}", e))),
        }

        if let Err(e) = fs::hard_link(&token_path, &latest_tmp).await {
            tracing::debug!(error = %e, "hard link unavailable, copying bytes");
            Self::write_durably(&latest_tmp, bytes).await?;
        }
        fs::rename(&latest_tmp, self.latest_path())
            .await
            .map_err(|e| Error::Storage(format!("latest.jpg commit failed: {}", e)))?;

        let ts = Utc::now().timestamp_millis();
        tracing::debug!(
            token = %token,
            ts = ts,
            size = bytes.len(),
            "Capture image published"
        );
        Ok(ts)
    }

    /// Write bytes to `path` and fsync before returning
    async fn write_durably(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| Error::Storage(format!("temp file create failed: {}", e)))?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::Storage(format!("image write failed: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("image flush failed: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Storage(format!("image fsync failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("uploads")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn publish_latest_roundtrip() {
        let (_dir, store) = store().await;
        assert!(!store.latest_exists());

        store.publish_latest(b"jpeg-one").await.unwrap();
        assert_eq!(fs::read(store.latest_path()).await.unwrap(), b"jpeg-one");

        store.publish_latest(b"jpeg-two").await.unwrap();
        assert_eq!(fs::read(store.latest_path()).await.unwrap(), b"jpeg-two");
    }

    #[tokio::test]
    async fn publish_capture_exposes_both_identities() {
        let (_dir, store) = store().await;
        store.publish_capture("abc123", b"meter-image").await.unwrap();

        assert_eq!(
            fs::read(store.capture_path("abc123")).await.unwrap(),
            b"meter-image"
        );
        assert_eq!(fs::read(store.latest_path()).await.unwrap(), b"meter-image");
        assert_eq!(store.capture_url("abc123"), "/uploads/abc123.jpg");
    }

    #[tokio::test]
    async fn publish_capture_replaces_previous_latest() {
        let (_dir, store) = store().await;
        store.publish_latest(b"old").await.unwrap();
        store.publish_capture("tok", b"new").await.unwrap();
        assert_eq!(fs::read(store.latest_path()).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn no_leftover_temp_after_publish() {
        let (_dir, store) = store().await;
        store.publish_capture("tok", b"new").await.unwrap();
        assert!(!store.upload_dir.join(LATEST_TMP).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_reader_never_sees_torn_latest() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (_dir, store) = store().await;
        let store = Arc::new(store);
        let one = vec![b'a'; 64 * 1024];
        let two = vec![b'b'; 64 * 1024];

        store.publish_latest(&one).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let store = store.clone();
            let stop = stop.clone();
            let (one, two) = (one.clone(), two.clone());
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    match fs::read(store.latest_path()).await {
                        Ok(bytes) => assert!(
                            bytes == one || bytes == two,
                            "torn read: {} bytes",
                            bytes.len()
                        ),
                        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => panic!("latest read failed: {}", e),
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..40u32 {
            if i % 2 == 0 {
                store
                    .publish_capture(&format!("tok{}", i), &two)
                    .await
                    .unwrap();
            } else {
                store.publish_latest(&one).await.unwrap();
            }
        }

        stop.store(true, Ordering::Relaxed);
        reader.await.unwrap();
    }
}
