use chrono::{DateTime, Utc};
use core_types::{Diary, DiaryVideo};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DiaryRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
    pub is_private: bool,
    pub video_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DiaryRow> for Diary {
    fn from(row: DiaryRow) -> Self {
        Diary {
            id: row.id,
            owner_id: row.user_id,
            title: row.title,
            description: row.description,
            cover_image_url: row.cover_image_url,
            is_private: row.is_private,
            video_count: u32::try_from(row.video_count.max(0)).unwrap_or(u32::MAX),
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DiaryVideoRow {
    pub id: String,
    pub diary_id: String,
    pub user_id: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration: f64,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

impl From<DiaryVideoRow> for DiaryVideo {
    fn from(row: DiaryVideoRow) -> Self {
        DiaryVideo {
            id: row.id,
            diary_id: row.diary_id,
            owner_id: row.user_id,
            video_url: row.video_url,
            thumbnail_url: row.thumbnail_url,
            duration: row.duration,
            order_index: row.order_index,
            created_at: row.created_at,
        }
    }
}
