//! # Shellsync
//!
//! A content-addressed offline cache synchronizer for packaged web
//! applications: stages an application shell during install, reconciles
//! the resource cache against a per-deployment manifest of content hashes
//! at activation, and serves intercepted fetches cache-first (online-first
//! for the entry document).
//!
//! ## Features
//!
//! - Manifest diffing that reuses unchanged resources across upgrades
//! - All-or-nothing staging of the mandatory core set
//! - Cache-first routing with lazy population, online-first entry document
//! - Fail-safe wipe on reconciliation errors (next activation cold-starts)
//! - Pluggable stores and fetcher for testing with in-memory fakes

pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod message;
pub mod reconcile;
pub mod router;
pub mod store;
pub mod worker;

pub use config::{WorkerConfig, create_client};
pub use error::{WorkerError, WorkerResult};
pub use fetch::{FetchMode, FetchedResponse, HttpFetcher, ResourceFetcher};
pub use manifest::{
    ContentHash, CoreSet, ManifestStore, ROOT_KEY, ResourceManifest, normalize_path,
    normalize_request_url,
};
pub use message::WorkerMessage;
pub use reconcile::Reconciler;
pub use router::{FetchRequest, FetchRouter, RouteOutcome, ServeSource, ServedResponse};
pub use store::{CacheStore, FileStore, MemoryStore, StoreResult, StoredResource};
pub use worker::{ServiceWorker, WorkerPhase};
