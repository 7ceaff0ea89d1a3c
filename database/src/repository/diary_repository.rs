use std::sync::Arc;

use chrono::Utc;
use core_types::{Diary, DiaryUpdate, NewDiary};
use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::{database_error::DatabaseError, models::DiaryRow};

const DIARY_COLUMNS: &str = "id, user_id, title, description, cover_image_url, is_private, video_count, is_deleted, created_at, updated_at";

#[derive(Debug)]
pub struct DiaryRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl DiaryRepository {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        Self { pool }
    }

    pub async fn get_diary(&self, diary_id: &str) -> Result<Option<Diary>, DatabaseError> {
        let row = sqlx::query_as::<_, DiaryRow>(&format!(
            "SELECT {} FROM diary WHERE id = ?",
            DIARY_COLUMNS
        ))
        .bind(diary_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(Diary::from))
    }

    pub async fn get_diaries_by_user(&self, user_id: &str) -> Result<Vec<Diary>, DatabaseError> {
        let rows = sqlx::query_as::<_, DiaryRow>(&format!(
            "SELECT {} FROM diary WHERE user_id = ? ORDER BY created_at DESC",
            DIARY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(Diary::from).collect())
    }

    pub async fn add_diary(&self, new_diary: &NewDiary) -> Result<Diary, DatabaseError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO diary (id, user_id, title, description, cover_image_url, is_private, video_count, is_deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&new_diary.owner_id)
        .bind(&new_diary.title)
        .bind(&new_diary.description)
        .bind(&new_diary.cover_image_url)
        .bind(new_diary.is_private)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(Diary {
            id,
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
        })
    }

    pub async fn update_diary(
        &self,
        diary_id: &str,
        update: &DiaryUpdate,
    ) -> Result<(), DatabaseError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new("UPDATE diary SET updated_at = ");
        query_builder.push_bind(Utc::now());
        if let Some(title) = &update.title {
            query_builder.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &update.description {
            query_builder
                .push(", description = ")
                .push_bind(description.clone());
        }
        if let Some(cover_image_url) = &update.cover_image_url {
            query_builder
                .push(", cover_image_url = ")
                .push_bind(cover_image_url.clone());
        }
        if let Some(is_private) = update.is_private {
            query_builder.push(", is_private = ").push_bind(is_private);
        }
        query_builder.push(" WHERE id = ").push_bind(diary_id.to_string());

        let result = query_builder.build().execute(&*self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(diary_id.to_string()));
        }
        Ok(())
    }

    pub async fn set_deleted(&self, diary_id: &str, is_deleted: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE diary SET is_deleted = ?, updated_at = ? WHERE id = ?")
            .bind(is_deleted)
            .bind(Utc::now())
            .bind(diary_id)
            .execute(&*self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(diary_id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_diary(&self, diary_id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM diary WHERE id = ?")
            .bind(diary_id)
            .execute(&*self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(diary_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup_test_db;

    fn new_diary(owner_id: &str, title: &str) -> NewDiary {
        NewDiary {
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: "desc".to_string(),
            cover_image_url: String::new(),
            is_private: false,
        }
    }

    async fn repository() -> DiaryRepository {
        let pool = Arc::new(setup_test_db().await);
        DiaryRepository::new(pool)
    }

    #[async_std::test]
    async fn test_add_and_get_diary() {
        let repo = repository().await;
        let created = repo.add_diary(&new_diary("u1", "Trip")).await.unwrap();

        let fetched = repo.get_diary(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Trip");
        assert_eq!(fetched.owner_id, "u1");
        assert_eq!(fetched.video_count, 0);
        assert!(!fetched.is_deleted);
    }

    #[async_std::test]
    async fn test_get_diaries_by_user_filters_owner_and_orders_newest_first() {
        let repo = repository().await;
        let first = repo.add_diary(&new_diary("u1", "First")).await.unwrap();
        async_std::task::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.add_diary(&new_diary("u1", "Second")).await.unwrap();
        repo.add_diary(&new_diary("u2", "Other")).await.unwrap();

        let diaries = repo.get_diaries_by_user("u1").await.unwrap();
        let ids: Vec<_> = diaries.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[async_std::test]
    async fn test_update_diary_merges_fields() {
        let repo = repository().await;
        let created = repo.add_diary(&new_diary("u1", "Trip")).await.unwrap();

        let update = DiaryUpdate {
            title: Some("Road trip".to_string()),
            is_private: Some(true),
            ..Default::default()
        };
        repo.update_diary(&created.id, &update).await.unwrap();

        let fetched = repo.get_diary(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Road trip");
        assert_eq!(fetched.description, "desc");
        assert!(fetched.is_private);
    }

    #[async_std::test]
    async fn test_update_missing_diary_is_not_found() {
        let repo = repository().await;
        let res = repo.update_diary("missing", &DiaryUpdate::default()).await;
        assert!(res.unwrap_err().is_not_found());
    }

    #[async_std::test]
    async fn test_soft_delete_twice_is_not_an_error() {
        let repo = repository().await;
        let created = repo.add_diary(&new_diary("u1", "Trip")).await.unwrap();

        repo.set_deleted(&created.id, true).await.unwrap();
        repo.set_deleted(&created.id, true).await.unwrap();

        let fetched = repo.get_diary(&created.id).await.unwrap().unwrap();
        assert!(fetched.is_deleted);
    }

    #[async_std::test]
    async fn test_delete_diary_twice_reports_not_found() {
        let repo = repository().await;
        let created = repo.add_diary(&new_diary("u1", "Trip")).await.unwrap();

        repo.delete_diary(&created.id).await.unwrap();
        let res = repo.delete_diary(&created.id).await;

        assert!(res.unwrap_err().is_not_found());
        assert!(repo.get_diary(&created.id).await.unwrap().is_none());
    }
}
