use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_std::channel::{Receiver, Sender};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Diary, DiaryUpdate, DiaryVideo, NewDiary, NewDiaryVideo};

use crate::{
    batch::{BatchOp, WriteBatch},
    database_error::DatabaseError,
    ops::DocumentStoreOps,
};

/// Operations of the mock that can be failed, held or counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetDiary,
    GetDiariesByOwner,
    CreateDiary,
    UpdateDiary,
    /// `set_diary_deleted(_, true)`
    SoftDelete,
    /// `set_diary_deleted(_, false)`
    Restore,
    DeleteDiary,
    GetVideoIds,
    AddVideo,
    DeleteVideo,
    CommitBatch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FailureKind {
    PermissionDenied,
    Unavailable,
}

/// Internal state for MockDocumentStore.
///
/// Groups all mutable state into a single struct for simplified locking.
#[derive(Default)]
struct MockState {
    diaries: HashMap<String, Diary>,
    videos: HashMap<String, DiaryVideo>,
    next_id: u64,
    /// Every call fails with this kind when set
    fail_all: Option<FailureKind>,
    /// Remaining forced failures per operation
    fail_operations: HashMap<StoreOperation, usize>,
    /// Calls to these operations wait until the sender is released
    holds: HashMap<StoreOperation, (Sender<()>, Receiver<()>)>,
    call_counts: HashMap<StoreOperation, usize>,
    committed_batch_sizes: Vec<usize>,
}

/// Mock implementation of DocumentStoreOps for testing
///
/// This mock allows you to:
/// - Seed diaries and videos
/// - Simulate permission and connectivity failures, globally or per operation
/// - Hold an operation until the test releases it
/// - Verify what operations were performed
#[derive(Clone, Default)]
pub struct MockDocumentStore {
    state: Arc<Mutex<MockState>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diary as if it already existed in the store
    pub fn add_diary(&self, diary: Diary) {
        let mut state = self.state.lock().unwrap();
        state.diaries.insert(diary.id.clone(), diary);
    }

    /// Add `count` videos to an existing diary and bump its counter
    pub fn add_videos(&self, diary_id: &str, count: usize) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let owner_id = state
            .diaries
            .get(diary_id)
            .map(|d| d.owner_id.clone())
            .unwrap_or_default();
        let mut ids = Vec::with_capacity(count);
        for order_index in 0..count {
            state.next_id += 1;
            let id = format!("video_{}", state.next_id);
            state.videos.insert(
                id.clone(),
                DiaryVideo {
                    id: id.clone(),
                    diary_id: diary_id.to_string(),
                    owner_id: owner_id.clone(),
                    video_url: String::new(),
                    thumbnail_url: String::new(),
                    duration: 1.0,
                    order_index: order_index as i64,
                    created_at: Utc::now(),
                },
            );
            ids.push(id);
        }
        if let Some(diary) = state.diaries.get_mut(diary_id) {
            diary.video_count += count as u32;
        }
        ids
    }

    pub fn diary(&self, diary_id: &str) -> Option<Diary> {
        let state = self.state.lock().unwrap();
        state.diaries.get(diary_id).cloned()
    }

    pub fn video_count_for(&self, diary_id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .videos
            .values()
            .filter(|v| v.diary_id == diary_id)
            .count()
    }

    /// Make every call fail like a backend rejecting the caller
    pub fn fail_all_with_permission_error(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_all = Some(FailureKind::PermissionDenied);
    }

    /// Make every call fail like an unreachable backend
    pub fn fail_all_as_unavailable(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_all = Some(FailureKind::Unavailable);
    }

    /// Stop failing all calls
    pub fn recover(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_all = None;
        state.fail_operations.clear();
    }

    /// Make an operation fail on every call
    pub fn fail_always(&self, operation: StoreOperation) {
        self.fail_times(operation, usize::MAX);
    }

    /// Make an operation fail on its next `times` calls
    pub fn fail_times(&self, operation: StoreOperation, times: usize) {
        let mut state = self.state.lock().unwrap();
        state.fail_operations.insert(operation, times);
    }

    /// Calls to `operation` wait until [`MockDocumentStore::release`] is called
    pub fn hold(&self, operation: StoreOperation) {
        let mut state = self.state.lock().unwrap();
        state
            .holds
            .insert(operation, async_std::channel::bounded(1));
    }

    /// Let held and future calls to `operation` proceed
    pub fn release(&self, operation: StoreOperation) {
        let mut state = self.state.lock().unwrap();
        if let Some((sender, _)) = state.holds.remove(&operation) {
            sender.close();
        }
    }

    pub fn call_count(&self, operation: StoreOperation) -> usize {
        let state = self.state.lock().unwrap();
        state.call_counts.get(&operation).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.call_counts.values().sum()
    }

    /// Sizes of all successfully committed batches, in commit order
    pub fn committed_batch_sizes(&self) -> Vec<usize> {
        let state = self.state.lock().unwrap();
        state.committed_batch_sizes.clone()
    }

    async fn enter(&self, operation: StoreOperation) -> Result<(), DatabaseError> {
        let hold = {
            let mut state = self.state.lock().unwrap();
            *state.call_counts.entry(operation).or_insert(0) += 1;
            state.holds.get(&operation).map(|(_, rx)| rx.clone())
        };

        if let Some(rx) = hold {
            // Resolves with an error once the sender is closed
            let _ = rx.recv().await;
        }

        let mut state = self.state.lock().unwrap();
        match state.fail_all {
            Some(FailureKind::PermissionDenied) => {
                return Err(DatabaseError::PermissionDenied(format!("{:?}", operation)));
            }
            Some(FailureKind::Unavailable) => {
                return Err(DatabaseError::Unavailable(format!("{:?}", operation)));
            }
            None => {}
        }
        if let Some(remaining) = state.fail_operations.get_mut(&operation)
            && *remaining > 0
        {
            if *remaining != usize::MAX {
                *remaining -= 1;
            }
            return Err(DatabaseError::Unavailable(format!(
                "Mock failure for {:?}",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStoreOps for MockDocumentStore {
    async fn get_diary(&self, diary_id: &str) -> Result<Option<Diary>, DatabaseError> {
        self.enter(StoreOperation::GetDiary).await?;
        Ok(self.diary(diary_id))
    }

    async fn get_diaries_by_owner(&self, owner_id: &str) -> Result<Vec<Diary>, DatabaseError> {
        self.enter(StoreOperation::GetDiariesByOwner).await?;
        let state = self.state.lock().unwrap();
        let mut diaries: Vec<Diary> = state
            .diaries
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        diaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(diaries)
    }

    async fn create_diary(&self, new_diary: &NewDiary) -> Result<Diary, DatabaseError> {
        self.enter(StoreOperation::CreateDiary).await?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let now = Utc::now();
        let diary = Diary {
            id: format!("doc_{}", state.next_id),
            owner_id: new_diary.owner_id.clone(),
            title: new_diary.title.clone(),
            description: new_diary.description.clone(),
            cover_image_url: new_diary.cover_image_url.clone(),
            is_private: new_diary.is_private,
            video_count: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            start_time: None,
        };
        state.diaries.insert(diary.id.clone(), diary.clone());
        Ok(diary)
    }

    async fn update_diary(
        &self,
        diary_id: &str,
        update: &DiaryUpdate,
    ) -> Result<(), DatabaseError> {
        self.enter(StoreOperation::UpdateDiary).await?;
        let mut state = self.state.lock().unwrap();
        let diary = state
            .diaries
            .get_mut(diary_id)
            .ok_or_else(|| DatabaseError::NotFound(diary_id.to_string()))?;
        diary.apply_update(update, Utc::now());
        Ok(())
    }

    async fn set_diary_deleted(
        &self,
        diary_id: &str,
        is_deleted: bool,
    ) -> Result<(), DatabaseError> {
        let operation = if is_deleted {
            StoreOperation::SoftDelete
        } else {
            StoreOperation::Restore
        };
        self.enter(operation).await?;
        let mut state = self.state.lock().unwrap();
        let diary = state
            .diaries
            .get_mut(diary_id)
            .ok_or_else(|| DatabaseError::NotFound(diary_id.to_string()))?;
        diary.is_deleted = is_deleted;
        diary.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_diary(&self, diary_id: &str) -> Result<(), DatabaseError> {
        self.enter(StoreOperation::DeleteDiary).await?;
        let mut state = self.state.lock().unwrap();
        state
            .diaries
            .remove(diary_id)
            .map(|_| ())
            .ok_or_else(|| DatabaseError::NotFound(diary_id.to_string()))
    }

    async fn get_video_ids_by_diary(&self, diary_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.enter(StoreOperation::GetVideoIds).await?;
        let state = self.state.lock().unwrap();
        let mut videos: Vec<&DiaryVideo> = state
            .videos
            .values()
            .filter(|v| v.diary_id == diary_id)
            .collect();
        videos.sort_by_key(|v| v.order_index);
        Ok(videos.into_iter().map(|v| v.id.clone()).collect())
    }

    async fn add_video(&self, new_video: &NewDiaryVideo) -> Result<DiaryVideo, DatabaseError> {
        self.enter(StoreOperation::AddVideo).await?;
        let mut state = self.state.lock().unwrap();
        if !state.diaries.contains_key(&new_video.diary_id) {
            return Err(DatabaseError::NotFound(new_video.diary_id.clone()));
        }
        state.next_id += 1;
        let video = DiaryVideo {
            id: format!("video_{}", state.next_id),
            diary_id: new_video.diary_id.clone(),
            owner_id: new_video.owner_id.clone(),
            video_url: new_video.video_url.clone(),
            thumbnail_url: new_video.thumbnail_url.clone(),
            duration: new_video.duration,
            order_index: new_video.order_index,
            created_at: Utc::now(),
        };
        state.videos.insert(video.id.clone(), video.clone());
        if let Some(diary) = state.diaries.get_mut(&new_video.diary_id) {
            diary.video_count += 1;
        }
        Ok(video)
    }

    async fn delete_video(&self, video_id: &str) -> Result<(), DatabaseError> {
        self.enter(StoreOperation::DeleteVideo).await?;
        let mut state = self.state.lock().unwrap();
        let video = state
            .videos
            .remove(video_id)
            .ok_or_else(|| DatabaseError::NotFound(video_id.to_string()))?;
        if let Some(diary) = state.diaries.get_mut(&video.diary_id) {
            diary.video_count = diary.video_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> Result<(), DatabaseError> {
        self.enter(StoreOperation::CommitBatch).await?;
        batch.validate()?;
        let mut state = self.state.lock().unwrap();

        // Validate first so a failing batch leaves no partial writes
        for op in batch.ops() {
            if let BatchOp::SetDiaryDeleted { diary_id, .. } = op
                && !state.diaries.contains_key(diary_id)
            {
                return Err(DatabaseError::NotFound(diary_id.clone()));
            }
        }

        for op in batch.ops() {
            match op {
                BatchOp::DeleteVideo(video_id) => {
                    state.videos.remove(video_id);
                }
                BatchOp::DeleteDiary(diary_id) => {
                    state.diaries.remove(diary_id);
                }
                BatchOp::SetDiaryDeleted {
                    diary_id,
                    is_deleted,
                } => {
                    if let Some(diary) = state.diaries.get_mut(diary_id) {
                        diary.is_deleted = *is_deleted;
                    }
                }
            }
        }
        state.committed_batch_sizes.push(batch.len());
        Ok(())
    }
}
