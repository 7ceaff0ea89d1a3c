use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{ArchivedDiary, Diary, DiaryUpdate, DiaryVideo};
use local_cache::LocalCache;
use serde::{Serialize, de::DeserializeOwned};

pub const DIARIES_KEY: &str = "diaries";
pub const VIDEOS_KEY: &str = "diaryVideos";
pub const LAST_DELETED_KEY: &str = "lastDeletedDiary";

pub fn archive_key(diary_id: &str) -> String {
    format!("diary_archive_{}", diary_id)
}

/// Typed view of the local cache.
///
/// Reads and writes never fail from the caller's point of view: a broken
/// or full cache is logged and treated as empty.
#[derive(Clone)]
pub struct DiaryCache {
    cache: Arc<dyn LocalCache>,
}

impl DiaryCache {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read local cache");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable local cache entry");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let result = serde_json::to_string(value)
            .map_err(crate::error::Error::from)
            .and_then(|raw| self.cache.set(key, &raw).map_err(Into::into));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to write local cache");
                false
            }
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.cache.remove(key) {
            tracing::warn!(key, error = %e, "Failed to remove local cache entry");
        }
    }

    pub fn diaries(&self) -> Vec<Diary> {
        self.read(DIARIES_KEY).unwrap_or_default()
    }

    /// Diaries of the owner that are not marked deleted, in stored order
    pub fn diaries_for_owner(&self, owner_id: &str) -> Vec<Diary> {
        self.diaries()
            .into_iter()
            .filter(|d| d.owner_id == owner_id && !d.is_deleted)
            .collect()
    }

    pub fn save_diaries(&self, diaries: &[Diary]) -> bool {
        self.write(DIARIES_KEY, diaries)
    }

    /// Put a new diary in front of the stored list
    pub fn prepend_diary(&self, diary: &Diary) -> bool {
        let mut diaries = self.diaries();
        diaries.retain(|d| d.id != diary.id);
        diaries.insert(0, diary.clone());
        self.save_diaries(&diaries)
    }

    /// Put a diary back at the end of the stored list unless it is there
    pub fn append_diary(&self, diary: &Diary) -> bool {
        let mut diaries = self.diaries();
        if diaries.iter().any(|d| d.id == diary.id) {
            return true;
        }
        diaries.push(diary.clone());
        self.save_diaries(&diaries)
    }

    /// Merge an update into a stored diary. Returns the updated diary if present.
    pub fn update_diary(
        &self,
        diary_id: &str,
        update: &DiaryUpdate,
        updated_at: DateTime<Utc>,
    ) -> Option<Diary> {
        let mut diaries = self.diaries();
        let diary = diaries.iter_mut().find(|d| d.id == diary_id)?;
        diary.apply_update(update, updated_at);
        let updated = diary.clone();
        self.save_diaries(&diaries);
        Some(updated)
    }

    pub fn videos(&self) -> Vec<DiaryVideo> {
        self.read(VIDEOS_KEY).unwrap_or_default()
    }

    pub fn save_videos(&self, videos: &[DiaryVideo]) -> bool {
        self.write(VIDEOS_KEY, videos)
    }

    /// Store a video and bump the owning diary's count
    pub fn add_video(&self, video: &DiaryVideo) -> bool {
        let mut videos = self.videos();
        videos.push(video.clone());
        if !self.save_videos(&videos) {
            return false;
        }
        let mut diaries = self.diaries();
        if let Some(diary) = diaries.iter_mut().find(|d| d.id == video.diary_id) {
            diary.video_count += 1;
            self.save_diaries(&diaries);
        }
        true
    }

    pub fn last_deleted(&self) -> Option<Diary> {
        self.read(LAST_DELETED_KEY)
    }

    pub fn clear_last_deleted(&self) {
        self.remove(LAST_DELETED_KEY);
    }

    /// Snapshot a diary before its deletion starts. The snapshot is both the
    /// undo candidate and an entry in the archive trail.
    pub fn archive(&self, diary: &Diary) -> bool {
        let archived = ArchivedDiary {
            diary: diary.clone(),
            archived_at: Utc::now(),
        };
        let trail = self.write(&archive_key(&diary.id), &archived);
        let last = self.write(LAST_DELETED_KEY, diary);
        trail && last
    }

    pub fn archived(&self, diary_id: &str) -> Option<ArchivedDiary> {
        self.read(&archive_key(diary_id))
    }
}

#[cfg(test)]
mod tests {
    use local_cache::MemoryLocalCache;

    use super::*;
    use crate::test_utils::diary;

    fn cache() -> (MemoryLocalCache, DiaryCache) {
        let memory = MemoryLocalCache::new();
        let cache = DiaryCache::new(Arc::new(memory.clone()));
        (memory, cache)
    }

    #[test]
    fn test_prepend_and_filter_by_owner() {
        let (_, cache) = cache();
        cache.prepend_diary(&diary("d1", "u1"));
        cache.prepend_diary(&diary("d2", "u2"));
        cache.prepend_diary(&diary("d3", "u1"));

        let ids: Vec<String> = cache
            .diaries_for_owner("u1")
            .into_iter()
            .map(|d| d.id)
            .collect();

        assert_eq!(ids, vec!["d3", "d1"]);
    }

    #[test]
    fn test_corrupt_entry_reads_as_empty() {
        let (memory, cache) = cache();
        memory.set(DIARIES_KEY, "{not json").unwrap();

        assert!(cache.diaries().is_empty());
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let (memory, cache) = cache();
        memory.fail_writes(true);

        assert!(!cache.prepend_diary(&diary("d1", "u1")));
        assert!(!cache.archive(&diary("d1", "u1")));
        cache.clear_last_deleted();
    }

    #[test]
    fn test_archive_writes_trail_and_undo_snapshot() {
        let (memory, cache) = cache();
        let d1 = diary("d1", "u1");

        assert!(cache.archive(&d1));

        assert_eq!(cache.last_deleted(), Some(d1.clone()));
        assert_eq!(cache.archived("d1").unwrap().diary, d1);
        cache.clear_last_deleted();
        assert!(!memory.contains_key(LAST_DELETED_KEY));
        assert!(memory.contains_key("diary_archive_d1"));
    }

    #[test]
    fn test_add_video_bumps_count() {
        let (_, cache) = cache();
        cache.prepend_diary(&diary("d1", "u1"));
        let video = DiaryVideo {
            id: "v1".to_string(),
            diary_id: "d1".to_string(),
            owner_id: "u1".to_string(),
            video_url: "file:///v1.webm".to_string(),
            thumbnail_url: String::new(),
            duration: 3.5,
            order_index: 0,
            created_at: Utc::now(),
        };

        assert!(cache.add_video(&video));

        assert_eq!(cache.diaries()[0].video_count, 1);
        assert_eq!(cache.videos(), vec![video]);
    }
}
