//! # Cache Store Trait
//!
//! This module defines the store trait that all cache backends must follow.

use async_trait::async_trait;

use crate::store::types::{StoreResult, StoredResource};

/// A keyed store for cached resource payloads.
///
/// Keys are normalized resource paths (the root document is `/`). Writes
/// are idempotent content overwrites, so concurrent puts for the same key
/// are benign.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Check if the store contains an entry for the given key.
    async fn contains(&self, key: &str) -> StoreResult<bool>;

    /// Get an entry from the store.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredResource>>;

    /// Put an entry into the store, overwriting any previous one.
    async fn put(&self, key: &str, resource: StoredResource) -> StoreResult<()>;

    /// Remove an entry from the store.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// List the logical keys of every stored entry.
    async fn keys(&self) -> StoreResult<Vec<String>>;

    /// Remove every entry from the store.
    async fn clear(&self) -> StoreResult<()>;
}
