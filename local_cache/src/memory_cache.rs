use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{LocalCache, LocalCacheError, validate_key};

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, String>,
    fail_writes: bool,
    fail_reads: bool,
}

/// In-memory cache, used in tests and when no cache directory is available.
///
/// Writes and reads can be made to fail to simulate a full or broken store.
#[derive(Clone, Default)]
pub struct MemoryLocalCache {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().values.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalCache for MemoryLocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError> {
        validate_key(key)?;
        let state = self.lock();
        if state.fail_reads {
            return Err(LocalCacheError::Other("Simulated read failure".to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalCacheError> {
        validate_key(key)?;
        let mut state = self.lock();
        if state.fail_writes {
            return Err(LocalCacheError::QuotaExceeded {
                needed: value.len() as u64,
                quota: 0,
            });
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LocalCacheError> {
        validate_key(key)?;
        let mut state = self.lock();
        if state.fail_writes {
            return Err(LocalCacheError::Other(
                "Simulated write failure".to_string(),
            ));
        }
        state.values.remove(key);
        Ok(())
    }
}
