//! # Service Worker
//!
//! The service object that owns the three named caches and drives the
//! worker lifecycle: install stages the core set, activate reconciles the
//! resource cache, and steady state routes intercepted fetches.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{WorkerConfig, create_client};
use crate::error::{WorkerError, WorkerResult};
use crate::fetch::{FetchMode, HttpFetcher, ResourceFetcher};
use crate::manifest::{CoreSet, ManifestStore, ResourceManifest};
use crate::message::WorkerMessage;
use crate::reconcile::Reconciler;
use crate::router::{FetchRequest, FetchRouter, RouteOutcome};
use crate::store::{CacheStore, FileStore};

/// Lifecycle phase of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Install is staging the core set.
    Installing,
    /// Install finished; waiting for the host to activate this version.
    Waiting,
    /// Reconciled and serving fetches.
    Active,
}

/// One worker instance for one deployment version.
///
/// Owns the resource cache, the staging cache, and the persisted manifest
/// record; handlers borrow it rather than reaching for globals.
pub struct ServiceWorker {
    manifest: Arc<ResourceManifest>,
    core: CoreSet,
    resource: Arc<dyn CacheStore>,
    staging: Arc<dyn CacheStore>,
    manifest_store: ManifestStore,
    fetcher: Arc<dyn ResourceFetcher>,
    reconciler: Reconciler,
    router: FetchRouter,
    phase: RwLock<WorkerPhase>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl ServiceWorker {
    /// Create a worker with disk-backed caches under the configured cache
    /// directory and an HTTP fetcher for the configured origin.
    pub fn new(
        config: WorkerConfig,
        manifest: ResourceManifest,
        core: CoreSet,
    ) -> WorkerResult<Self> {
        let cache_dir = config.resolved_cache_dir();
        let resource: Arc<dyn CacheStore> = Arc::new(FileStore::new(cache_dir.join("resources")));
        let staging: Arc<dyn CacheStore> = Arc::new(FileStore::new(cache_dir.join("staging")));
        let manifest_backing: Arc<dyn CacheStore> =
            Arc::new(FileStore::new(cache_dir.join("manifest")));

        let client = create_client(&config)?;
        let fetcher: Arc<dyn ResourceFetcher> =
            Arc::new(HttpFetcher::new(client, config.origin.clone()));

        Ok(Self::with_parts(
            config,
            manifest,
            core,
            resource,
            staging,
            manifest_backing,
            fetcher,
        ))
    }

    /// Create a worker from explicit parts. This is the seam the tests
    /// use to inject in-memory stores and a scripted fetcher.
    pub fn with_parts(
        config: WorkerConfig,
        manifest: ResourceManifest,
        core: CoreSet,
        resource: Arc<dyn CacheStore>,
        staging: Arc<dyn CacheStore>,
        manifest_backing: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        let manifest = Arc::new(manifest);
        let manifest_store = ManifestStore::new(manifest_backing);
        let reconciler = Reconciler::new(
            resource.clone(),
            staging.clone(),
            manifest_store.clone(),
        );
        let router = FetchRouter::new(
            config.origin.clone(),
            manifest.clone(),
            resource.clone(),
            fetcher.clone(),
        );

        Self {
            manifest,
            core,
            resource,
            staging,
            manifest_store,
            fetcher,
            reconciler,
            router,
            phase: RwLock::new(WorkerPhase::Installing),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    /// Install handler: stage the whole core set into the staging cache.
    ///
    /// All-or-nothing; on any failure the staging cache is left empty and
    /// the host discards this worker version.
    pub async fn install(&self) -> WorkerResult<()> {
        *self.phase.write() = WorkerPhase::Installing;
        // Install requests immediate promotion, in addition to the
        // explicit skipWaiting message.
        self.request_skip_waiting();

        if let Err(err) = self.stage_core_set().await {
            if let Err(e) = self.staging.clear().await {
                warn!(error = %e, "Failed to clear staging cache after aborted install");
            }
            return Err(err);
        }

        *self.phase.write() = WorkerPhase::Waiting;
        info!(staged = self.core.len(), "Install complete, worker waiting");
        Ok(())
    }

    async fn stage_core_set(&self) -> WorkerResult<()> {
        // Fetch everything before storing anything, so a failed core
        // resource stages nothing at all.
        let fetches = self.core.iter().map(|path| async move {
            let response = self.fetcher.fetch(path, FetchMode::Reload).await?;
            if !response.is_success() {
                return Err(WorkerError::Staging {
                    path: path.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((path, response))
        });
        let fetched = futures::future::try_join_all(fetches).await?;

        for (path, response) in fetched {
            self.staging.put(path, response.to_stored()).await?;
        }
        Ok(())
    }

    /// Activate handler: reconcile the resource cache against the new
    /// manifest, then claim all open clients.
    ///
    /// A reconciliation error is terminal for the cache, not for the
    /// worker: everything is wiped so the next activation cold-starts.
    pub async fn activate(&self) {
        match self.reconciler.reconcile(&self.manifest).await {
            Ok(()) => {
                self.claim_clients();
                *self.phase.write() = WorkerPhase::Active;
            }
            Err(err) => {
                // A half-applied reconciliation leaves an unknown mix of
                // old and new resources; an empty cache is recoverable.
                error!("Failed to upgrade service worker: {err}");
                for (name, store) in [("resource", &self.resource), ("staging", &self.staging)] {
                    if let Err(e) = store.clear().await {
                        warn!(store = name, error = %e, "Failed to wipe cache after reconcile error");
                    }
                }
                if let Err(e) = self.manifest_store.clear().await {
                    warn!(error = %e, "Failed to wipe manifest record after reconcile error");
                }
            }
        }
    }

    /// Fetch handler: serve a managed resource or tell the host to handle
    /// the request itself.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> WorkerResult<RouteOutcome> {
        self.router.route(request).await
    }

    /// Message handler for out-of-band control commands.
    pub async fn handle_message(&self, data: &str) -> WorkerResult<()> {
        match WorkerMessage::parse(data) {
            Some(WorkerMessage::SkipWaiting) => {
                self.request_skip_waiting();
                Ok(())
            }
            Some(WorkerMessage::DownloadOffline) => self.download_offline().await,
            None => {
                debug!(message = data, "Ignoring unknown control message");
                Ok(())
            }
        }
    }

    /// Fetch and store every manifest resource not yet present in the
    /// resource cache, making the app fully available offline.
    pub async fn download_offline(&self) -> WorkerResult<()> {
        let cached: HashSet<String> = self.resource.keys().await?.into_iter().collect();
        let missing: Vec<&str> = self
            .manifest
            .keys()
            .filter(|key| !cached.contains(*key))
            .collect();
        if missing.is_empty() {
            debug!("All manifest resources already cached");
            return Ok(());
        }

        let fetches = missing.iter().map(|key| async move {
            let response = self.fetcher.fetch(key, FetchMode::Default).await?;
            if !response.is_success() {
                return Err(WorkerError::Status(response.status));
            }
            Ok((*key, response))
        });
        let fetched = futures::future::try_join_all(fetches).await?;

        let count = fetched.len();
        for (key, response) in fetched {
            self.resource.put(key, response.to_stored()).await?;
        }
        info!(downloaded = count, "Offline download complete");
        Ok(())
    }

    /// Request that this version be promoted without waiting.
    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Relaxed);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    /// Whether this worker has taken control of all open clients.
    pub fn controls_clients(&self) -> bool {
        self.clients_claimed.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.read()
    }

    fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::Relaxed);
        info!("Worker now controls all clients");
    }
}
