use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod deletion;

pub use deletion::{DeletionJob, DeletionState};

pub type DiaryId = String;
pub type UserId = String;

/// A user-owned collection of short videos.
///
/// Serialized with the same field names the local cache has always used, so
/// snapshots written by older sessions stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diary {
    pub id: DiaryId,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "coverImageURL", default)]
    pub cover_image_url: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub video_count: u32,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while a deletion is in flight, only used for latency logging.
    #[serde(skip)]
    pub start_time: Option<Instant>,
}

impl Diary {
    pub fn apply_update(&mut self, update: &DiaryUpdate, updated_at: DateTime<Utc>) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(cover_image_url) = &update.cover_image_url {
            self.cover_image_url = cover_image_url.clone();
        }
        if let Some(is_private) = update.is_private {
            self.is_private = is_private;
        }
        self.updated_at = updated_at;
    }

    /// Storage prefix under which all blobs of this diary live.
    pub fn storage_prefix(&self) -> String {
        diary_storage_prefix(&self.owner_id, &self.id)
    }
}

pub fn diary_storage_prefix(owner_id: &str, diary_id: &str) -> String {
    format!("diaries/{}/{}", owner_id, diary_id)
}

/// Input for creating a diary. Identifier and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDiary {
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
    pub is_private: bool,
}

/// Partial update of the editable diary fields. Identifier and owner are not editable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "coverImageURL", skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

impl DiaryUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.cover_image_url.is_none()
            && self.is_private.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryVideo {
    pub id: String,
    pub diary_id: DiaryId,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(rename = "videoURL", default)]
    pub video_url: String,
    #[serde(rename = "thumbnailURL", default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDiaryVideo {
    pub diary_id: DiaryId,
    pub owner_id: UserId,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration: f64,
    pub order_index: i64,
}

/// Point-in-time copy of a diary taken before any remote deletion step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDiary {
    #[serde(flatten)]
    pub diary: Diary,
    pub archived_at: DateTime<Utc>,
}
