//! # Cache Reconciler
//!
//! The diff-and-merge step run once per activation: compares the incoming
//! manifest against the persisted one, evicts cached entries whose hash
//! changed or whose path disappeared, merges the staged core set, and
//! persists the new manifest.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::WorkerResult;
use crate::manifest::{ManifestStore, ResourceManifest};
use crate::store::CacheStore;

/// Reconciles the resource cache with a new deployment manifest.
///
/// `reconcile` is idempotent with respect to repeated identical manifests:
/// running it twice in a row leaves the same cache key set behind. The
/// caller wraps it in the fail-safe wipe; any error escaping here means
/// the cache state can no longer be trusted.
pub struct Reconciler {
    resource: Arc<dyn CacheStore>,
    staging: Arc<dyn CacheStore>,
    manifest_store: ManifestStore,
}

impl Reconciler {
    pub fn new(
        resource: Arc<dyn CacheStore>,
        staging: Arc<dyn CacheStore>,
        manifest_store: ManifestStore,
    ) -> Self {
        Self {
            resource,
            staging,
            manifest_store,
        }
    }

    /// Apply `new_manifest`, reusing unchanged cached resources.
    pub async fn reconcile(&self, new_manifest: &ResourceManifest) -> WorkerResult<()> {
        match self.manifest_store.load().await? {
            None => self.cold_start(new_manifest).await,
            Some(old_manifest) => self.upgrade(&old_manifest, new_manifest).await,
        }
    }

    /// First install: nothing about the existing cache can be trusted, so
    /// rebuild it from the staged entries alone.
    async fn cold_start(&self, new_manifest: &ResourceManifest) -> WorkerResult<()> {
        info!("No prior manifest, rebuilding resource cache from staged entries");
        self.resource.clear().await?;
        self.merge_staged().await?;
        self.staging.clear().await?;
        self.manifest_store.save(new_manifest).await?;
        Ok(())
    }

    /// Upgrade: sweep the cache against the manifest diff, then merge the
    /// staged core set on top.
    async fn upgrade(
        &self,
        old_manifest: &ResourceManifest,
        new_manifest: &ResourceManifest,
    ) -> WorkerResult<()> {
        let mut retained = 0usize;
        let mut evicted = 0usize;

        for key in self.resource.keys().await? {
            // A resource survives the upgrade only if the new manifest
            // still lists it with the same hash the old manifest had.
            let unchanged = match (new_manifest.hash_of(&key), old_manifest.hash_of(&key)) {
                (Some(new_hash), Some(old_hash)) => new_hash == old_hash,
                _ => false,
            };
            if unchanged {
                retained += 1;
            } else {
                debug!(key, "Evicting stale cache entry");
                self.resource.remove(&key).await?;
                evicted += 1;
            }
        }

        // Staged entries win over anything retained above, so the core
        // set is always fresh after an upgrade.
        let staged = self.merge_staged().await?;
        self.staging.clear().await?;
        self.manifest_store.save(new_manifest).await?;

        info!(retained, evicted, staged, "Reconciled resource cache");
        Ok(())
    }

    /// Copy every staged entry into the resource cache.
    async fn merge_staged(&self) -> WorkerResult<usize> {
        let mut merged = 0usize;
        for key in self.staging.keys().await? {
            if let Some(resource) = self.staging.get(&key).await? {
                self.resource.put(&key, resource).await?;
                merged += 1;
            }
        }
        Ok(merged)
    }
}
