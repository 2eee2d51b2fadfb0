//! # Cache Stores
//!
//! Storage backends for the worker's three named caches (resources,
//! staging, manifest record). Everything goes through the [`CacheStore`]
//! trait so the reconciler and the fetch router can be exercised against
//! in-memory stores.

mod file;
mod memory;
mod provider;
mod types;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use provider::CacheStore;
pub use types::{StoreResult, StoredResource};
