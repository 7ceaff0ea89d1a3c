use std::sync::Arc;

use chrono::Utc;
use core_types::{DiaryVideo, NewDiaryVideo};
use sqlx::{Pool, Sqlite};

use crate::{database_error::DatabaseError, models::DiaryVideoRow};

#[derive(Debug)]
pub struct DiaryVideoRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl DiaryVideoRepository {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        Self { pool }
    }

    pub async fn get_video_ids_by_diary(&self, diary_id: &str) -> Result<Vec<String>, DatabaseError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM diary_video WHERE diary_id = ? ORDER BY order_index",
        )
        .bind(diary_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn get_videos_by_diary(&self, diary_id: &str) -> Result<Vec<DiaryVideo>, DatabaseError> {
        let rows = sqlx::query_as::<_, DiaryVideoRow>(
            "SELECT id, diary_id, user_id, video_url, thumbnail_url, duration, order_index, created_at
             FROM diary_video
             WHERE diary_id = ?
             ORDER BY order_index",
        )
        .bind(diary_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(DiaryVideo::from).collect())
    }

    /// Inserts the video and bumps the owning diary's counter in one transaction.
    pub async fn add_video(&self, new_video: &NewDiaryVideo) -> Result<DiaryVideo, DatabaseError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let mut transaction = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE diary SET video_count = video_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(&new_video.diary_id)
        .execute(&mut *transaction)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(new_video.diary_id.clone()));
        }

        sqlx::query(
            "INSERT INTO diary_video (id, diary_id, user_id, video_url, thumbnail_url, duration, order_index, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_video.diary_id)
        .bind(&new_video.owner_id)
        .bind(&new_video.video_url)
        .bind(&new_video.thumbnail_url)
        .bind(new_video.duration)
        .bind(new_video.order_index)
        .bind(now)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(DiaryVideo {
            id,
            diary_id: new_video.diary_id.clone(),
            owner_id: new_video.owner_id.clone(),
            video_url: new_video.video_url.clone(),
            thumbnail_url: new_video.thumbnail_url.clone(),
            duration: new_video.duration,
            order_index: new_video.order_index,
            created_at: now,
        })
    }

    /// Removes the video and decrements the counter, never below zero.
    pub async fn delete_video(&self, video_id: &str) -> Result<(), DatabaseError> {
        let mut transaction = self.pool.begin().await?;

        let diary_id = sqlx::query_scalar::<_, String>("SELECT diary_id FROM diary_video WHERE id = ?")
            .bind(video_id)
            .fetch_optional(&mut *transaction)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(video_id.to_string()))?;

        sqlx::query("DELETE FROM diary_video WHERE id = ?")
            .bind(video_id)
            .execute(&mut *transaction)
            .await?;

        sqlx::query(
            "UPDATE diary SET video_count = MAX(video_count - 1, 0), updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(&diary_id)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{repository::diary_repository::DiaryRepository, setup_test_db};
    use core_types::NewDiary;

    struct TestSetup {
        diaries: DiaryRepository,
        videos: DiaryVideoRepository,
        diary_id: String,
    }

    async fn prepare_test() -> TestSetup {
        let pool = Arc::new(setup_test_db().await);
        let diaries = DiaryRepository::new(pool.clone());
        let videos = DiaryVideoRepository::new(pool);
        let diary = diaries
            .add_diary(&NewDiary {
                owner_id: "u1".to_string(),
                title: "Trip".to_string(),
                description: String::new(),
                cover_image_url: String::new(),
                is_private: false,
            })
            .await
            .unwrap();
        TestSetup {
            diaries,
            videos,
            diary_id: diary.id,
        }
    }

    fn new_video(diary_id: &str, order_index: i64) -> NewDiaryVideo {
        NewDiaryVideo {
            diary_id: diary_id.to_string(),
            owner_id: "u1".to_string(),
            video_url: format!("https://videos/{}", order_index),
            thumbnail_url: String::new(),
            duration: 4.5,
            order_index,
        }
    }

    #[async_std::test]
    async fn test_add_video_increments_count() {
        let setup = prepare_test().await;
        setup.videos.add_video(&new_video(&setup.diary_id, 0)).await.unwrap();
        setup.videos.add_video(&new_video(&setup.diary_id, 1)).await.unwrap();

        let diary = setup.diaries.get_diary(&setup.diary_id).await.unwrap().unwrap();
        assert_eq!(diary.video_count, 2);
        let videos = setup.videos.get_videos_by_diary(&setup.diary_id).await.unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[1].order_index, 1);
    }

    #[async_std::test]
    async fn test_add_video_to_missing_diary_fails_without_insert() {
        let setup = prepare_test().await;
        let res = setup.videos.add_video(&new_video("missing", 0)).await;
        assert!(res.unwrap_err().is_not_found());
        assert!(setup.videos.get_video_ids_by_diary("missing").await.unwrap().is_empty());
    }

    #[async_std::test]
    async fn test_delete_video_decrements_count() {
        let setup = prepare_test().await;
        let video = setup.videos.add_video(&new_video(&setup.diary_id, 0)).await.unwrap();

        setup.videos.delete_video(&video.id).await.unwrap();

        let diary = setup.diaries.get_diary(&setup.diary_id).await.unwrap().unwrap();
        assert_eq!(diary.video_count, 0);
        assert!(setup.videos.delete_video(&video.id).await.unwrap_err().is_not_found());
    }
}
