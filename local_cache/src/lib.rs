//! Synchronous key/value storage that survives restarts.
//!
//! Every operation can fail (a full disk, an exceeded quota, a broken
//! permission). Callers are expected to log the failure and carry on without
//! the cached value.

mod file_cache;
mod memory_cache;

use thiserror::Error;

pub use file_cache::FileLocalCache;
pub use memory_cache::MemoryLocalCache;

#[derive(Error, Debug)]
pub enum LocalCacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Local cache error: {0}")]
    Other(String),
}

pub trait LocalCache: Send + Sync {
    /// Stored value, `None` if the key was never set or has been removed
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError>;

    fn set(&self, key: &str, value: &str) -> Result<(), LocalCacheError>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), LocalCacheError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), LocalCacheError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LocalCacheError::InvalidKey(key.to_string()))
    }
}
