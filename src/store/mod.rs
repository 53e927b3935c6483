//! Record store abstraction.
//!
//! The record store is the only state shared between the serving process and
//! the privileged enforcement agent. Its atomic primitives (TTL writes,
//! windowed increments, get-and-delete, blocking list pop) are the sole
//! synchronization between them, so the trait is kept to exactly those.
//!
//! - `RedisStore`: production backend
//! - `MemoryStore`: in-process backend with a controllable clock for tests

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached. Callers may retry.
    #[error("Record store unreachable: {0}")]
    Connection(String),

    /// The store answered with an error.
    #[error("Record store error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("Corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Narrow key/value interface over the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Check the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Read and delete a value in one step.
    async fn take(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value with no expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Write a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Whether a live key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increment a counter that lives for `window` from its first
    /// increment. Returns the count after incrementing.
    async fn incr_window(&self, key: &str, window: Duration) -> StoreResult<u64>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Append to the tail of a list.
    async fn rpush(&self, list: &str, value: &str) -> StoreResult<()>;

    /// Pop from the head of a list, waiting up to `timeout` for an element.
    async fn blpop(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>>;
}

/// Decode a JSON record read from `key`.
pub fn decode_record<T: DeserializeOwned>(key: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a record as JSON.
pub fn encode_record<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}
