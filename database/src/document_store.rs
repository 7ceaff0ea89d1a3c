use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use core_types::{Diary, DiaryUpdate, DiaryVideo, NewDiary, NewDiaryVideo};

use crate::{
    batch::{BatchOp, WriteBatch},
    database_error::DatabaseError,
    ops::DocumentStoreOps,
    repository_manager::RepositoryManager,
};

/// Document store backed by SQLite.
#[derive(Debug)]
pub struct SqliteDocumentStore {
    repository_manager: Arc<RepositoryManager>,
}

impl SqliteDocumentStore {
    pub fn new(repository_manager: Arc<RepositoryManager>) -> Self {
        Self { repository_manager }
    }
}

#[async_trait]
impl DocumentStoreOps for SqliteDocumentStore {
    async fn get_diary(&self, diary_id: &str) -> Result<Option<Diary>, DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .get_diary(diary_id)
            .await
    }

    async fn get_diaries_by_owner(&self, owner_id: &str) -> Result<Vec<Diary>, DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .get_diaries_by_user(owner_id)
            .await
    }

    async fn create_diary(&self, new_diary: &NewDiary) -> Result<Diary, DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .add_diary(new_diary)
            .await
    }

    async fn update_diary(
        &self,
        diary_id: &str,
        update: &DiaryUpdate,
    ) -> Result<(), DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .update_diary(diary_id, update)
            .await
    }

    async fn set_diary_deleted(
        &self,
        diary_id: &str,
        is_deleted: bool,
    ) -> Result<(), DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .set_deleted(diary_id, is_deleted)
            .await
    }

    async fn delete_diary(&self, diary_id: &str) -> Result<(), DatabaseError> {
        self.repository_manager
            .get_diary_repository()
            .delete_diary(diary_id)
            .await
    }

    async fn get_video_ids_by_diary(&self, diary_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.repository_manager
            .get_diary_video_repository()
            .get_video_ids_by_diary(diary_id)
            .await
    }

    async fn add_video(&self, new_video: &NewDiaryVideo) -> Result<DiaryVideo, DatabaseError> {
        self.repository_manager
            .get_diary_video_repository()
            .add_video(new_video)
            .await
    }

    async fn delete_video(&self, video_id: &str) -> Result<(), DatabaseError> {
        self.repository_manager
            .get_diary_video_repository()
            .delete_video(video_id)
            .await
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> Result<(), DatabaseError> {
        batch.validate()?;
        let pool = self.repository_manager.get_pool();
        let mut transaction = pool.begin().await?;

        for op in batch.ops() {
            match op {
                BatchOp::DeleteVideo(video_id) => {
                    sqlx::query("DELETE FROM diary_video WHERE id = ?")
                        .bind(video_id)
                        .execute(&mut *transaction)
                        .await?;
                }
                BatchOp::DeleteDiary(diary_id) => {
                    sqlx::query("DELETE FROM diary WHERE id = ?")
                        .bind(diary_id)
                        .execute(&mut *transaction)
                        .await?;
                }
                BatchOp::SetDiaryDeleted {
                    diary_id,
                    is_deleted,
                } => {
                    let result = sqlx::query(
                        "UPDATE diary SET is_deleted = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(*is_deleted)
                    .bind(Utc::now())
                    .bind(diary_id)
                    .execute(&mut *transaction)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(DatabaseError::NotFound(diary_id.clone()));
                    }
                }
            }
        }

        transaction.commit().await?;
        tracing::debug!(operations = batch.len(), "Committed write batch");
        Ok(())
    }
}
