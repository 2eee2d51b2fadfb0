//! # Resource Fetching
//!
//! Network access behind a trait so the router, staging, and warm-up paths
//! can be driven by a scripted fetcher in tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{WorkerError, WorkerResult};
use crate::manifest::ROOT_KEY;
use crate::store::StoredResource;

/// How a fetch should interact with intermediary HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Normal request semantics.
    #[default]
    Default,
    /// Forced revalidation, bypassing intermediary caches. Used when
    /// staging the core set so the shell is always fetched fresh.
    Reload,
}

/// A completed network response for one resource.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl FetchedResponse {
    pub fn new(status: StatusCode, bytes: Bytes) -> Self {
        Self {
            status,
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Whether the response status allows the payload to be cached by the
    /// cache-first path.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into a storable cache entry.
    pub fn to_stored(&self) -> StoredResource {
        StoredResource::new(self.bytes.clone())
            .with_content_type(self.content_type.clone())
            .with_status(self.status.as_u16())
    }
}

/// Fetches one managed resource by its normalized key.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, key: &str, mode: FetchMode) -> WorkerResult<FetchedResponse>;
}

/// HTTP fetcher resolving keys against the managed origin.
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(client: Client, origin: Url) -> Self {
        Self { client, origin }
    }

    fn url_for(&self, key: &str) -> WorkerResult<Url> {
        if key == ROOT_KEY {
            return Ok(self.origin.clone());
        }
        self.origin
            .join(key)
            .map_err(|e| WorkerError::UrlError(format!("{key}: {e}")))
    }
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, key: &str, mode: FetchMode) -> WorkerResult<FetchedResponse> {
        let url = self.url_for(key)?;
        let mut request = self.client.get(url.clone());
        if mode == FetchMode::Reload {
            request = request
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = content_type_of(&response);
        let bytes = response.bytes().await?;

        debug!(key, %status, size = bytes.len(), "Fetched resource");
        Ok(FetchedResponse::new(status, bytes).with_content_type(content_type))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher used by the router, worker, and staging tests.

    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone)]
    enum Script {
        Respond {
            status: StatusCode,
            body: Bytes,
        },
        NetworkError,
    }

    /// A [`ResourceFetcher`] that replays scripted outcomes and records
    /// every call it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, Script>>,
        log: Mutex<Vec<(String, FetchMode)>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(&self, key: &str, status: u16, body: &str) {
            self.scripts.lock().insert(
                key.to_string(),
                Script::Respond {
                    status: StatusCode::from_u16(status).unwrap(),
                    body: Bytes::from(body.to_string()),
                },
            );
        }

        pub(crate) fn fail(&self, key: &str) {
            self.scripts
                .lock()
                .insert(key.to_string(), Script::NetworkError);
        }

        pub(crate) fn calls_for(&self, key: &str) -> usize {
            self.log.lock().iter().filter(|(k, _)| k == key).count()
        }

        pub(crate) fn total_calls(&self) -> usize {
            self.log.lock().len()
        }

        pub(crate) fn modes_for(&self, key: &str) -> Vec<FetchMode> {
            self.log
                .lock()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, mode)| *mode)
                .collect()
        }
    }

    #[async_trait]
    impl ResourceFetcher for ScriptedFetcher {
        async fn fetch(&self, key: &str, mode: FetchMode) -> WorkerResult<FetchedResponse> {
            self.log.lock().push((key.to_string(), mode));
            let script = self.scripts.lock().get(key).cloned();
            match script {
                Some(Script::Respond { status, body }) => Ok(FetchedResponse::new(status, body)
                    .with_content_type(Some("application/octet-stream".to_string()))),
                Some(Script::NetworkError) => Err(WorkerError::Generic(format!(
                    "simulated network failure for {key}"
                ))),
                None => Err(WorkerError::Generic(format!("no script for {key}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorkerConfig, create_client};

    fn fetcher() -> HttpFetcher {
        let origin = Url::parse("https://app.example.com").unwrap();
        let client = create_client(&WorkerConfig::new(origin.clone())).unwrap();
        HttpFetcher::new(client, origin)
    }

    #[test]
    fn root_key_resolves_to_the_origin_itself() {
        let fetcher = fetcher();
        assert_eq!(
            fetcher.url_for(ROOT_KEY).unwrap().as_str(),
            "https://app.example.com/"
        );
    }

    #[test]
    fn relative_keys_resolve_under_the_origin() {
        let fetcher = fetcher();
        assert_eq!(
            fetcher.url_for("assets/x.png").unwrap().as_str(),
            "https://app.example.com/assets/x.png"
        );
    }

    #[test]
    fn failed_status_is_not_storable() {
        let resp = FetchedResponse::new(StatusCode::NOT_FOUND, Bytes::new());
        assert!(!resp.is_success());

        let stored = resp.to_stored();
        assert_eq!(stored.status, 404);
    }
}
