//! # Resource Manifest
//!
//! This module defines the typed resource manifest (normalized path to
//! content hash), the ordered core set of boot-critical paths, and the
//! store that persists the last-applied manifest across worker upgrades.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::WorkerResult;
use crate::store::{CacheStore, StoredResource};

/// Canonical lookup key for the entry document.
pub const ROOT_KEY: &str = "/";

/// Storage key under which the persisted manifest record lives.
const MANIFEST_RECORD_KEY: &str = "manifest";

/// Opaque content digest for one resource, as produced by the build step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Digest of a resource payload, matching the hex MD5 digests the build
    /// pipeline emits into the manifest.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentHash {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

impl From<&str> for ContentHash {
    fn from(digest: &str) -> Self {
        Self(digest.to_string())
    }
}

/// Normalize a manifest or core-set path to its lookup key.
///
/// The root document is represented as `/`; every other key is the path
/// relative to the origin. A `?v=...` cache-busting query is stripped.
pub fn normalize_path(path: &str) -> String {
    let path = match path.find("?v=") {
        Some(idx) => &path[..idx],
        None => path,
    };
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        ROOT_KEY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalize an intercepted request URL to a manifest lookup key.
///
/// Returns `None` for URLs outside the managed origin (the host environment
/// handles those). The key is everything after the origin: path, query,
/// and fragment. A `?v=` cache-buster truncates the key from that point;
/// the bare origin and root-anchored `/#...` URLs collapse to [`ROOT_KEY`].
/// Any other query or fragment stays in the key, which then never matches
/// a manifest entry.
pub fn normalize_request_url(raw: &str, origin: &Url) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if url.origin() != origin.origin() {
        return None;
    }

    // A root-anchored fragment is a client-side route into the entry
    // document; a root query is not.
    if url.path() == "/" && url.query().is_none() {
        return Some(ROOT_KEY.to_string());
    }

    let mut key = url.path().trim_start_matches('/').to_string();
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        key.push('#');
        key.push_str(fragment);
    }
    if let Some(idx) = key.find("?v=") {
        key.truncate(idx);
    }

    if key.is_empty() {
        Some(ROOT_KEY.to_string())
    } else {
        Some(key)
    }
}

/// Mapping from normalized resource path to content hash, authoritative for
/// one deployment version.
///
/// Keys are normalized exactly once, at ingestion; lookups take
/// already-normalized keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest {
    entries: HashMap<String, ContentHash>,
}

impl ResourceManifest {
    /// Build a manifest from `(path, hash)` pairs emitted by the build step.
    pub fn from_entries<I, P, H>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, H)>,
        P: AsRef<str>,
        H: Into<ContentHash>,
    {
        let entries = entries
            .into_iter()
            .map(|(path, hash)| (normalize_path(path.as_ref()), hash.into()))
            .collect();
        Self { entries }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn hash_of(&self, key: &str) -> Option<&ContentHash> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered list of paths that must be staged before the application can
/// boot offline; a subset of the manifest's keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreSet {
    paths: Vec<String>,
}

impl CoreSet {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            paths: paths.into_iter().map(|p| normalize_path(p.as_ref())).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Persists the single last-applied manifest snapshot.
///
/// The record is the only entry in its backing store, mirroring the three
/// separate named caches of the worker (resources, staging, manifest).
#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn CacheStore>,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Load the previously applied manifest, if any.
    ///
    /// A corrupt record is an error; the caller's fail-safe path handles it
    /// the same way as any other reconciliation failure.
    pub async fn load(&self) -> WorkerResult<Option<ResourceManifest>> {
        match self.store.get(MANIFEST_RECORD_KEY).await? {
            Some(stored) => {
                let manifest: ResourceManifest = serde_json::from_slice(&stored.bytes)?;
                Ok(Some(manifest))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the persisted snapshot with `manifest`.
    pub async fn save(&self, manifest: &ResourceManifest) -> WorkerResult<()> {
        let json = serde_json::to_vec(manifest)?;
        let record = StoredResource::new(Bytes::from(json))
            .with_content_type(Some("application/json".to_string()));
        self.store.put(MANIFEST_RECORD_KEY, record).await?;
        debug!(entries = manifest.len(), "Persisted manifest snapshot");
        Ok(())
    }

    /// Discard the persisted snapshot; the next activation cold-starts.
    pub async fn clear(&self) -> WorkerResult<()> {
        self.store.clear().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn origin() -> Url {
        Url::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn content_hash_of_bytes_is_hex_md5() {
        let hash = ContentHash::of_bytes(b"abc");
        assert_eq!(hash.as_str(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn manifest_keys_are_normalized_at_ingestion() {
        let manifest = ResourceManifest::from_entries([
            ("/", "h0"),
            ("/index.html", "h1"),
            ("main.dart.js?v=123", "h2"),
        ]);
        assert!(manifest.contains(ROOT_KEY));
        assert!(manifest.contains("index.html"));
        assert!(manifest.contains("main.dart.js"));
        assert_eq!(manifest.len(), 3);
    }

    #[test]
    fn root_url_variants_normalize_to_root_key() {
        for raw in [
            "https://app.example.com",
            "https://app.example.com/",
            "https://app.example.com/#foo",
            "https://app.example.com/?v=42",
        ] {
            assert_eq!(
                normalize_request_url(raw, &origin()).as_deref(),
                Some(ROOT_KEY),
                "{raw}"
            );
        }
    }

    #[test]
    fn version_query_is_stripped() {
        assert_eq!(
            normalize_request_url("https://app.example.com/main.dart.js?v=123", &origin())
                .as_deref(),
            Some("main.dart.js")
        );
    }

    #[test]
    fn non_version_query_stays_in_the_key() {
        assert_eq!(
            normalize_request_url("https://app.example.com/page?a=1", &origin()).as_deref(),
            Some("page?a=1")
        );
    }

    #[test]
    fn root_url_with_plain_query_is_not_the_entry_document() {
        assert_eq!(
            normalize_request_url("https://app.example.com/?a=1", &origin()).as_deref(),
            Some("?a=1")
        );
    }

    #[test]
    fn version_query_truncates_everything_after_it() {
        assert_eq!(
            normalize_request_url("https://app.example.com/page?v=1#sec", &origin()).as_deref(),
            Some("page")
        );
    }

    #[test]
    fn cross_origin_urls_are_unmanaged() {
        assert_eq!(
            normalize_request_url("https://cdn.example.org/lib.js", &origin()),
            None
        );
    }

    #[test]
    fn non_root_fragment_keeps_the_anchor() {
        assert_eq!(
            normalize_request_url("https://app.example.com/page#sec", &origin()).as_deref(),
            Some("page#sec")
        );
    }

    #[tokio::test]
    async fn manifest_store_round_trip() {
        let store = ManifestStore::new(Arc::new(MemoryStore::new()));
        assert!(store.load().await.unwrap().is_none());

        let manifest = ResourceManifest::from_entries([("a.js", "h1"), ("/", "h2")]);
        store.save(&manifest).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(manifest));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_manifest_record_is_an_error() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .put(
                "manifest",
                StoredResource::new(Bytes::from_static(b"not json")),
            )
            .await
            .unwrap();
        let store = ManifestStore::new(backing);
        assert!(store.load().await.is_err());
    }
}
