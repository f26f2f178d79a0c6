//! KeyValueStore trait and key rules

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value storage
///
/// Values are opaque strings; callers own serialization. A missing key is
/// reported as `None`, never as an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// List all keys in sorted order
    async fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Check that a key is usable as a relative storage path
///
/// Keys are non-empty, made of `[A-Za-z0-9._/-]`, and contain no empty or
/// `.`/`..` segments.
pub fn validate_key(key: &str) -> StoreResult<()> {
    debug!(%key, "validate_key: called");
    let invalid = |reason| {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return invalid("key is empty");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
    {
        return invalid("only [A-Za-z0-9._/-] allowed");
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return invalid("empty or relative path segment");
    }
    Ok(())
}
