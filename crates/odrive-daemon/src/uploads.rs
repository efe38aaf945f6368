//! In-flight upload accounting for the ciphertext caches.
//!
//! The drain protocol only needs to know how many uploads are still buffered
//! locally, so each cache exposes `count_uploaded()` and [`CacheSet`]
//! enumerates the active caches. [`DiskCache`] is the local store behind the
//! `/ciphertext` routes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid ciphertext key: {0:?}")]
    InvalidKey(String),
    #[error("no ciphertext for key {0}")]
    NotFound(String),
    #[error("cache i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// A local ciphertext cache in front of the remote store.
pub trait CiphertextCache: Send + Sync {
    fn cache_id(&self) -> &str;

    /// Uploads still buffered locally and not yet durable remotely.
    fn count_uploaded(&self) -> usize;
}

/// Counts uploads through RAII guards.
#[derive(Debug)]
pub struct UploadTracker {
    id: String,
    in_flight: Arc<AtomicUsize>,
}

impl UploadTracker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mark an upload as started. It counts until the guard drops.
    pub fn begin(&self) -> UploadGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        UploadGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl CiphertextCache for UploadTracker {
    fn cache_id(&self) -> &str {
        &self.id
    }

    fn count_uploaded(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[must_use = "the upload stops counting when the guard drops"]
#[derive(Debug)]
pub struct UploadGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Every active cache in the process.
#[derive(Default)]
pub struct CacheSet {
    caches: RwLock<Vec<Arc<dyn CiphertextCache>>>,
}

impl CacheSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cache: Arc<dyn CiphertextCache>) {
        self.caches
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(cache);
    }

    pub fn find_all(&self) -> Vec<Arc<dyn CiphertextCache>> {
        self.caches
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sum of `count_uploaded()` across every cache.
    pub fn count_uploaded(&self) -> usize {
        self.find_all().iter().map(|c| c.count_uploaded()).sum()
    }
}

/// Ciphertext files under one directory.
///
/// A `put` counts as an in-flight upload until its bytes are renamed into
/// place, so a drain waits for partially written files.
pub struct DiskCache {
    root: PathBuf,
    tracker: UploadTracker,
}

impl DiskCache {
    pub fn new(partition: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracker: UploadTracker::new(partition),
        }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let _upload = self.tracker.begin();
        tokio::fs::create_dir_all(&self.root).await?;
        let partial = self.root.join(format!("{key}.partial"));
        tokio::fs::write(&partial, data).await?;
        tokio::fs::rename(&partial, &path).await?;
        tracing::debug!(key, bytes = data.len(), "ciphertext cached");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Keys are hex digests; anything else could escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl CiphertextCache for DiskCache {
    fn cache_id(&self) -> &str {
        self.tracker.cache_id()
    }

    fn count_uploaded(&self) -> usize {
        self.tracker.count_uploaded()
    }
}
