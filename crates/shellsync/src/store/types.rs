//! # Store Types
//!
//! Common types shared by the store implementations.

use bytes::Bytes;

/// A cached resource payload plus the response fields the router needs to
/// replay it.
///
/// The content hash is deliberately not part of the entry; hashes are only
/// known through the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    /// Resource payload.
    pub bytes: Bytes,
    /// Content type of the original response, if it carried one.
    pub content_type: Option<String>,
    /// HTTP status of the original response.
    pub status: u16,
}

impl StoredResource {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            content_type: None,
            status: 200,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a store operation.
pub type StoreResult<T> = std::result::Result<T, std::io::Error>;
