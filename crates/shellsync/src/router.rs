//! # Fetch Router
//!
//! Per-request routing: unmanaged requests pass through to the host
//! environment, the entry document is served online-first, and every other
//! manifest resource is served cache-first with lazy population.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::WorkerResult;
use crate::fetch::{FetchMode, FetchedResponse, ResourceFetcher};
use crate::manifest::{ROOT_KEY, ResourceManifest, normalize_request_url};
use crate::store::{CacheStore, StoredResource};

/// An intercepted request, reduced to what routing needs.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    Cache,
    Network,
}

/// A response produced by the router on behalf of the host.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub status: StatusCode,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub source: ServeSource,
}

impl ServedResponse {
    fn from_cache(stored: StoredResource) -> Self {
        Self {
            status: StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK),
            bytes: stored.bytes,
            content_type: stored.content_type,
            source: ServeSource::Cache,
        }
    }

    fn from_network(response: &FetchedResponse) -> Self {
        Self {
            status: response.status,
            bytes: response.bytes.clone(),
            content_type: response.content_type.clone(),
            source: ServeSource::Network,
        }
    }
}

/// Routing decision for one request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Not a managed resource; the host environment handles it.
    Passthrough,
    /// Served by the worker, from cache or network.
    Serve(ServedResponse),
}

/// Routes intercepted requests against the manifest and resource cache.
pub struct FetchRouter {
    origin: Url,
    manifest: Arc<ResourceManifest>,
    resource: Arc<dyn CacheStore>,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl FetchRouter {
    pub fn new(
        origin: Url,
        manifest: Arc<ResourceManifest>,
        resource: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            origin,
            manifest,
            resource,
            fetcher,
        }
    }

    /// Route one request.
    ///
    /// Errors surface only for requests the worker decided to serve; a
    /// passthrough never fails.
    pub async fn route(&self, request: &FetchRequest) -> WorkerResult<RouteOutcome> {
        if request.method != Method::GET {
            return Ok(RouteOutcome::Passthrough);
        }

        let Some(key) = normalize_request_url(&request.url, &self.origin) else {
            return Ok(RouteOutcome::Passthrough);
        };
        if !self.manifest.contains(&key) {
            debug!(key, "Request not in manifest, passing through");
            return Ok(RouteOutcome::Passthrough);
        }

        let served = if key == ROOT_KEY {
            self.online_first(&key).await?
        } else {
            self.cache_first(&key).await?
        };
        Ok(RouteOutcome::Serve(served))
    }

    /// Serve from cache; on miss fetch once and populate the cache with
    /// successful responses only.
    async fn cache_first(&self, key: &str) -> WorkerResult<ServedResponse> {
        if let Some(stored) = self.resource.get(key).await? {
            debug!(key, "Cache hit");
            return Ok(ServedResponse::from_cache(stored));
        }

        let response = self.fetcher.fetch(key, FetchMode::Default).await?;
        if response.is_success() {
            self.resource.put(key, response.to_stored()).await?;
        }
        Ok(ServedResponse::from_network(&response))
    }

    /// Entry document policy: network first so new deployments are picked
    /// up, cache fallback so the app still boots offline.
    async fn online_first(&self, key: &str) -> WorkerResult<ServedResponse> {
        match self.fetcher.fetch(key, FetchMode::Default).await {
            Ok(response) => {
                // The root document is refreshed on every successful
                // fetch, whatever its status.
                self.resource.put(key, response.to_stored()).await?;
                Ok(ServedResponse::from_network(&response))
            }
            Err(err) => match self.resource.get(key).await? {
                Some(stored) => {
                    debug!(key, "Network failed, serving cached entry document");
                    Ok(ServedResponse::from_cache(stored))
                }
                None => Err(err),
            },
        }
    }
}
