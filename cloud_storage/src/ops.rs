use async_trait::async_trait;

use crate::CloudStorageError;

/// Trait for blob storage operations to enable testing
///
/// Keys are `/` separated paths such as `diaries/{owner}/{diary}/cover`.
#[async_trait]
pub trait CloudStorageOps: Send + Sync {
    /// Upload bytes under the given key, replacing any existing blob
    async fn upload_file(&self, cloud_key: &str, content: &[u8]) -> Result<(), CloudStorageError>;

    /// Public URL of a blob
    async fn get_url(&self, cloud_key: &str) -> Result<String, CloudStorageError>;

    /// Delete a blob. Callers decide whether a missing blob is an error
    async fn delete_file(&self, cloud_key: &str) -> Result<(), CloudStorageError>;

    /// Keys of all blobs under the prefix, recursively
    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError>;
}
