//! # Memory Store
//!
//! In-memory store implementation, used for transient caches and as the
//! test double for the reconciler and router.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::store::provider::CacheStore;
use crate::store::types::{StoreResult, StoredResource};

/// Memory-backed store. Entries live until removed or cleared; there is no
/// eviction, since retained entries must survive until the next
/// reconciliation decides their fate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredResource>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredResource>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, resource: StoredResource) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), resource);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        if self.entries.write().remove(key).is_some() {
            debug!(key, "Removed entry from memory store");
        }
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.entries.write().clear();
        debug!("Memory store cleared");
        Ok(())
    }
}
