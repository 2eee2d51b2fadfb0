use reqwest::StatusCode;

// Custom error type for worker cache operations
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("Store I/O error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Persisted manifest is corrupt: {0}")]
    ManifestFormat(#[from] serde_json::Error),

    #[error("Failed to stage core resource {path}: {reason}")]
    Staging { path: String, reason: String },

    #[error("Generic worker error: {0}")]
    Generic(String),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
