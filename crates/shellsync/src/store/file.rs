//! # File Store
//!
//! Disk-backed store implementation. Entries persist across worker
//! restarts, which is what lets reconciliation reuse unchanged resources
//! from one deployment to the next.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::store::provider::CacheStore;
use crate::store::types::{StoreResult, StoredResource};

/// Sidecar record written next to each payload file. The logical key is
/// recorded here because payload filenames are digests and cannot be
/// mapped back to a resource path on their own.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    content_type: Option<String>,
    status: u16,
    size: u64,
    stored_at: u64,
}

impl EntryMeta {
    fn for_resource(key: &str, resource: &StoredResource) -> Self {
        Self {
            key: key.to_string(),
            content_type: resource.content_type.clone(),
            status: resource.status,
            size: resource.bytes.len() as u64,
            stored_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// File-backed store rooted at one directory per named cache.
#[derive(Debug, Clone)]
pub struct FileStore {
    store_dir: PathBuf,
    initialized: Arc<AtomicBool>,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    pub fn new(store_dir: PathBuf) -> Self {
        Self {
            store_dir,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the store directory on first use.
    async fn ensure_initialized(&self) -> io::Result<()> {
        // Fast path - already initialized
        if self.initialized.load(Ordering::Relaxed) {
            return Ok(());
        }

        if self
            .initialized
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            fs::create_dir_all(&self.store_dir).await?;
            self.initialized.store(true, Ordering::Release);
        } else {
            // Another task is initializing, wait for it to complete
            while !self.initialized.load(Ordering::Acquire) {
                tokio::task::yield_now().await;
            }
        }

        Ok(())
    }

    /// Filename-safe digest of a logical key.
    fn filename(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.store_dir.join(Self::filename(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        let mut path = self.data_path(key);
        path.set_extension("meta");
        path
    }
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    async fn contains(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized().await?;

        let data_exists = fs::try_exists(&self.data_path(key)).await?;
        let meta_exists = fs::try_exists(&self.meta_path(key)).await?;
        Ok(data_exists && meta_exists)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredResource>> {
        self.ensure_initialized().await?;

        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);

        if !fs::try_exists(&data_path).await? || !fs::try_exists(&meta_path).await? {
            return Ok(None);
        }

        let meta_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to read store metadata file");
                return Ok(None);
            }
        };

        let meta: EntryMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to parse store metadata, dropping entry");
                let _ = fs::remove_file(&data_path).await;
                let _ = fs::remove_file(&meta_path).await;
                return Ok(None);
            }
        };

        let data = fs::read(&data_path).await?;
        Ok(Some(
            StoredResource::new(Bytes::from(data))
                .with_content_type(meta.content_type)
                .with_status(meta.status),
        ))
    }

    async fn put(&self, key: &str, resource: StoredResource) -> StoreResult<()> {
        self.ensure_initialized().await?;

        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);

        let meta = EntryMeta::for_resource(key, &resource);
        let meta_json = serde_json::to_vec(&meta).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize entry metadata: {e}"),
            )
        })?;

        // Write to temporary files first, then rename, so a partial write
        // never shadows a complete older entry.
        let temp_data_path = data_path.with_extension("tmp");
        let temp_meta_path = meta_path.with_extension("mtmp");

        fs::write(&temp_data_path, &resource.bytes).await?;
        if let Err(e) = fs::write(&temp_meta_path, &meta_json).await {
            let _ = fs::remove_file(&temp_data_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_data_path, &data_path).await {
            let _ = fs::remove_file(&temp_data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(key, size = meta.size, "Stored entry to disk");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.ensure_initialized().await?;

        let data_result = fs::remove_file(&self.data_path(key)).await;
        let meta_result = fs::remove_file(&self.meta_path(key)).await;

        // Missing files are fine; anything else is reported.
        match (data_result, meta_result) {
            (Err(e), _) if e.kind() != io::ErrorKind::NotFound => {
                warn!(key, error = %e, "Failed to remove store data file");
                Err(e)
            }
            (_, Err(e)) if e.kind() != io::ErrorKind::NotFound => {
                warn!(key, error = %e, "Failed to remove store metadata file");
                Err(e)
            }
            _ => Ok(()),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.ensure_initialized().await?;

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.store_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<EntryMeta>(&bytes) {
                    Ok(meta) => keys.push(meta.key),
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Skipping unreadable store metadata")
                    }
                },
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable store metadata"),
            }
        }
        Ok(keys)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.ensure_initialized().await?;

        let mut removed = 0usize;
        let mut entries = fs::read_dir(&self.store_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %e, "Failed to remove store file");
            } else {
                removed += 1;
            }
        }

        debug!(count = removed, "Cleared store entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[inline]
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer() // Write to test output
            .try_init();
    }

    fn resource(content: &str) -> StoredResource {
        StoredResource::new(Bytes::from(content.to_string()))
            .with_content_type(Some("text/plain".to_string()))
    }

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("resources"));
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store();
        store.put("a.js", resource("payload")).await.unwrap();

        let got = store.get("a.js").await.unwrap().unwrap();
        assert_eq!(got.bytes, Bytes::from_static(b"payload"));
        assert_eq!(got.content_type.as_deref(), Some("text/plain"));
        assert_eq!(got.status, 200);
    }

    #[tokio::test]
    async fn keys_recovers_logical_paths() {
        let (_dir, store) = store();
        store.put("/", resource("root")).await.unwrap();
        store.put("assets/x.png", resource("img")).await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["/".to_string(), "assets/x.png".to_string()]);
    }

    #[tokio::test]
    async fn get_miss_and_remove_are_quiet() {
        let (_dir, store) = store();
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.remove("missing").await.is_ok());
    }

    #[tokio::test]
    async fn remove_deletes_payload_and_sidecar() {
        let (_dir, store) = store();
        store.put("a.js", resource("x")).await.unwrap();
        assert!(store.contains("a.js").await.unwrap());

        store.remove("a.js").await.unwrap();
        assert!(!store.contains("a.js").await.unwrap());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_then_reuse() {
        init_tracing();
        let (_dir, store) = store();
        store.put("a.js", resource("a")).await.unwrap();
        store.put("b.js", resource("b")).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());

        // Store stays usable after a wipe.
        store.put("c.js", resource("c")).await.unwrap();
        assert!(store.contains("c.js").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_sidecar_is_dropped_on_get() {
        init_tracing();
        let (_dir, store) = store();
        store.put("a.js", resource("x")).await.unwrap();

        let meta_path = store.meta_path("a.js");
        fs::write(&meta_path, b"not json").await.unwrap();

        assert!(store.get("a.js").await.unwrap().is_none());
        // The broken entry was removed entirely.
        assert!(!store.contains("a.js").await.unwrap());
    }

    #[tokio::test]
    async fn entries_survive_a_new_store_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources");

        let first = FileStore::new(path.clone());
        first.put("a.js", resource("persisted")).await.unwrap();
        drop(first);

        let second = FileStore::new(path);
        let got = second.get("a.js").await.unwrap().unwrap();
        assert_eq!(got.bytes, Bytes::from_static(b"persisted"));
    }
}
