use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{LocalCache, LocalCacheError, validate_key};

/// Stores each key in its own file under a directory.
pub struct FileLocalCache {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileLocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LocalCacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota_bytes: None,
        })
    }

    /// Limit the total size of all stored values
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, LocalCacheError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn used_bytes_excluding(&self, excluded: &Path) -> Result<u64, LocalCacheError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == excluded {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

impl LocalCache for FileLocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalCacheError> {
        let path = self.path_for(key)?;
        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes_excluding(&path)? + value.len() as u64;
            if needed > quota {
                return Err(LocalCacheError::QuotaExceeded { needed, quota });
            }
        }

        // Write then rename so a crash never leaves a truncated value
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LocalCacheError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileLocalCache::new(temp_dir.path()).unwrap();

        assert_eq!(cache.get("diaries").unwrap(), None);
        cache.set("diaries", "[]").unwrap();
        assert_eq!(cache.get("diaries").unwrap(), Some("[]".to_string()));

        cache.remove("diaries").unwrap();
        assert_eq!(cache.get("diaries").unwrap(), None);
        cache.remove("diaries").unwrap();
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        FileLocalCache::new(temp_dir.path())
            .unwrap()
            .set("lastDeletedDiary", "{}")
            .unwrap();

        let reopened = FileLocalCache::new(temp_dir.path()).unwrap();

        assert_eq!(
            reopened.get("lastDeletedDiary").unwrap(),
            Some("{}".to_string())
        );
    }

    #[test]
    fn test_quota_counts_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileLocalCache::new(temp_dir.path()).unwrap().with_quota(10);

        cache.set("a", "123456").unwrap();
        // Overwriting a key only counts its new size
        cache.set("a", "1234567").unwrap();
        let err = cache.set("b", "12345").unwrap_err();

        assert!(matches!(
            err,
            LocalCacheError::QuotaExceeded {
                needed: 12,
                quota: 10
            }
        ));
        assert_eq!(cache.get("b").unwrap(), None);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileLocalCache::new(temp_dir.path()).unwrap();

        assert!(matches!(
            cache.set("../x", "1"),
            Err(LocalCacheError::InvalidKey(_))
        ));
    }
}
