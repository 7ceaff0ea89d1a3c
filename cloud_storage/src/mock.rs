use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{CloudStorageError, ops::CloudStorageOps};

/// Internal state for MockCloudStorage.
///
/// Groups all mutable state into a single struct for simplified locking.
#[derive(Default)]
struct MockState {
    /// Stores uploaded files (cloud_key -> file content)
    uploaded_files: BTreeMap<String, Vec<u8>>,
    /// Tracks which files were deleted
    deleted_files: HashSet<String>,
    /// Keys that should fail on upload
    fail_upload_keys: HashSet<String>,
    /// Keys that should fail on deletion
    fail_delete_keys: HashSet<String>,
    /// Listing fails for every prefix
    fail_list: bool,
    delete_calls: usize,
}

/// Mock implementation of CloudStorageOps for testing
///
/// This mock allows you to:
/// - Simulate file uploads and deletions
/// - Test failure scenarios
/// - Verify what operations were performed
#[derive(Clone, Default)]
pub struct MockCloudStorage {
    state: Arc<Mutex<MockState>>,
}

impl MockCloudStorage {
    /// Create a new mock cloud storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file that already exists in cloud storage (for testing)
    pub fn add_file(&self, cloud_key: impl Into<String>, content: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.uploaded_files.insert(cloud_key.into(), content);
    }

    /// Add a file with dummy content
    pub fn add_file_dummy(&self, cloud_key: impl Into<String>) {
        let key = cloud_key.into();
        let content = format!("mock-content-for-{}", key).into_bytes();
        self.add_file(key, content);
    }

    /// Make upload fail for a specific key
    pub fn fail_upload_for(&self, cloud_key: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.fail_upload_keys.insert(cloud_key.into());
    }

    /// Make deletion fail for a specific key
    pub fn fail_delete_for(&self, cloud_key: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.fail_delete_keys.insert(cloud_key.into());
    }

    /// Make every listing fail
    pub fn fail_list(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_list = true;
    }

    /// Check if a file was uploaded
    pub fn was_uploaded(&self, cloud_key: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.uploaded_files.contains_key(cloud_key)
    }

    /// Check if a file was deleted
    pub fn was_deleted(&self, cloud_key: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.deleted_files.contains(cloud_key)
    }

    /// Get the number of uploaded files
    pub fn uploaded_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.uploaded_files.len()
    }

    /// Number of delete calls, successful or not
    pub fn delete_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.delete_calls
    }
}

#[async_trait]
impl CloudStorageOps for MockCloudStorage {
    async fn upload_file(&self, cloud_key: &str, content: &[u8]) -> Result<(), CloudStorageError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_upload_keys.contains(cloud_key) {
            return Err(CloudStorageError::Other(format!(
                "Mock upload failure for key: {}",
                cloud_key
            )));
        }
        state
            .uploaded_files
            .insert(cloud_key.to_string(), content.to_vec());
        state.deleted_files.remove(cloud_key);
        Ok(())
    }

    async fn get_url(&self, cloud_key: &str) -> Result<String, CloudStorageError> {
        Ok(format!("mock://{}", cloud_key))
    }

    async fn delete_file(&self, cloud_key: &str) -> Result<(), CloudStorageError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;

        if state.fail_delete_keys.contains(cloud_key) {
            return Err(CloudStorageError::Other(format!(
                "Mock deletion failure for key: {}",
                cloud_key
            )));
        }

        if state.uploaded_files.remove(cloud_key).is_none() {
            return Err(CloudStorageError::NotFound(cloud_key.to_string()));
        }
        state.deleted_files.insert(cloud_key.to_string());
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(CloudStorageError::Other("Mock list failure".to_string()));
        }
        Ok(state
            .uploaded_files
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
