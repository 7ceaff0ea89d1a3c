use async_trait::async_trait;
use core_types::{Diary, DiaryUpdate, DiaryVideo, NewDiary, NewDiaryVideo};

use crate::{batch::WriteBatch, database_error::DatabaseError};

/// Trait for document store operations to enable testing
///
/// Records are typed at this boundary; unknown fields never reach callers.
#[async_trait]
pub trait DocumentStoreOps: Send + Sync {
    /// Get a diary by id, including soft-deleted ones
    async fn get_diary(&self, diary_id: &str) -> Result<Option<Diary>, DatabaseError>;

    /// All diaries of an owner, most recent first, including soft-deleted ones
    async fn get_diaries_by_owner(&self, owner_id: &str) -> Result<Vec<Diary>, DatabaseError>;

    /// Create a diary; the store assigns the id and both timestamps
    async fn create_diary(&self, new_diary: &NewDiary) -> Result<Diary, DatabaseError>;

    /// Merge a partial update. Fails with `NotFound` for a missing diary
    async fn update_diary(&self, diary_id: &str, update: &DiaryUpdate)
    -> Result<(), DatabaseError>;

    /// Set or clear the soft-delete flag. Setting it twice is not an error
    async fn set_diary_deleted(&self, diary_id: &str, is_deleted: bool)
    -> Result<(), DatabaseError>;

    /// Remove a diary document. Fails with `NotFound` for a missing diary
    async fn delete_diary(&self, diary_id: &str) -> Result<(), DatabaseError>;

    /// Ids of all videos belonging to a diary
    async fn get_video_ids_by_diary(&self, diary_id: &str) -> Result<Vec<String>, DatabaseError>;

    /// Add a video and increment the diary's video count
    async fn add_video(&self, new_video: &NewDiaryVideo) -> Result<DiaryVideo, DatabaseError>;

    /// Remove a video and decrement the diary's video count, never below zero
    async fn delete_video(&self, video_id: &str) -> Result<(), DatabaseError>;

    /// Commit all operations atomically
    async fn commit_batch(&self, batch: &WriteBatch) -> Result<(), DatabaseError>;
}
