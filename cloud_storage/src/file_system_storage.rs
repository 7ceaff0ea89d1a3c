use std::path::{Path, PathBuf};

use async_std::stream::StreamExt;
use async_trait::async_trait;

use crate::{CloudStorageError, ops::CloudStorageOps};

/// Blob store backed by a local directory. Keys map to relative paths.
pub struct FileSystemCloudStorage {
    root: PathBuf,
}

impl FileSystemCloudStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, cloud_key: &str) -> Result<PathBuf, CloudStorageError> {
        let mut path = self.root.clone();
        for segment in cloud_key.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(CloudStorageError::Other(format!(
                    "Invalid key: {}",
                    cloud_key
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }
}

#[async_trait]
impl CloudStorageOps for FileSystemCloudStorage {
    async fn upload_file(&self, cloud_key: &str, content: &[u8]) -> Result<(), CloudStorageError> {
        let path = self.path_for(cloud_key)?;
        if let Some(parent) = path.parent() {
            async_std::fs::create_dir_all(parent).await?;
        }
        async_std::fs::write(&path, content).await?;
        Ok(())
    }

    async fn get_url(&self, cloud_key: &str) -> Result<String, CloudStorageError> {
        let path = self.path_for(cloud_key)?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete_file(&self, cloud_key: &str) -> Result<(), CloudStorageError> {
        let path = self.path_for(cloud_key)?;
        match async_std::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CloudStorageError::NotFound(cloud_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError> {
        let start = self.path_for(prefix)?;
        let mut keys = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match async_std::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next().await {
                let entry = entry?;
                let path: PathBuf = entry.path().into();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[async_std::test]
    async fn test_upload_list_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileSystemCloudStorage::new(temp_dir.path());

        storage.upload_file("diaries/u1/d1/cover", b"img").await.unwrap();
        storage.upload_file("diaries/u1/d1/v/1.mp4", b"vid").await.unwrap();
        storage.upload_file("diaries/u1/d2/cover", b"img").await.unwrap();

        let keys = storage.list_files("diaries/u1/d1").await.unwrap();
        assert_eq!(keys, vec!["diaries/u1/d1/cover", "diaries/u1/d1/v/1.mp4"]);

        storage.delete_file("diaries/u1/d1/cover").await.unwrap();
        let keys = storage.list_files("diaries/u1/d1").await.unwrap();
        assert_eq!(keys, vec!["diaries/u1/d1/v/1.mp4"]);
    }

    #[async_std::test]
    async fn test_missing_prefix_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileSystemCloudStorage::new(temp_dir.path());

        let keys = storage.list_files("diaries/nobody").await.unwrap();

        assert!(keys.is_empty());
    }

    #[async_std::test]
    async fn test_delete_missing_blob_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileSystemCloudStorage::new(temp_dir.path());

        let err = storage.delete_file("diaries/u1/gone").await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[async_std::test]
    async fn test_parent_segments_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileSystemCloudStorage::new(temp_dir.path());

        let result = storage.upload_file("../escape", b"x").await;

        assert!(matches!(result, Err(CloudStorageError::Other(_))));
    }
}
