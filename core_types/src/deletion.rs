use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// States of a diary deletion job.
///
/// The pipeline walks them in declaration order from `Pending` to `Completed`.
/// `Failed` is re-entered into `SoftDeleted` while retries remain, `Recovered`
/// is reached when the user undoes the deletion before any video is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionState {
    #[strum(serialize = "idle")]
    Idle,
    #[strum(serialize = "pending")]
    Pending,
    #[strum(serialize = "soft-deleted")]
    SoftDeleted,
    #[strum(serialize = "deleting-videos")]
    DeletingVideos,
    #[strum(serialize = "deleting-storage")]
    DeletingStorage,
    #[strum(serialize = "deleting-diary")]
    DeletingDiary,
    #[strum(serialize = "completed")]
    Completed,
    #[strum(serialize = "failed")]
    Failed,
    #[strum(serialize = "recovered")]
    Recovered,
}

impl DeletionState {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(&self, next: DeletionState) -> bool {
        use DeletionState::*;
        matches!(
            (*self, next),
            (Idle, Pending)
                | (Pending, SoftDeleted)
                | (SoftDeleted, DeletingVideos)
                | (DeletingVideos, DeletingStorage)
                | (DeletingStorage, DeletingDiary)
                | (DeletingDiary, Completed)
                | (Failed, SoftDeleted)
                | (Pending | SoftDeleted | DeletingVideos | DeletingStorage | DeletingDiary, Failed)
                | (Pending | SoftDeleted | Failed, Recovered)
        )
    }
}

/// Tracks one attempt to delete exactly one diary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionJob {
    pub id: String,
    pub diary_id: String,
    pub state: DeletionState,
    pub error: Option<String>,
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while a failed job waits for its backoff to elapse.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Once set, purged videos can no longer be brought back by recovery.
    pub videos_purge_started: bool,
}

impl DeletionJob {
    pub fn new(id: String, diary_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            diary_id,
            state: DeletionState::Pending,
            error: None,
            retry_count: 0,
            started_at: now,
            updated_at: now,
            next_retry_at: None,
            videos_purge_started: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.state {
            DeletionState::Completed | DeletionState::Recovered => true,
            DeletionState::Failed => self.next_retry_at.is_none(),
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Recovery only restores the soft-delete flag, so it is offered only
    /// until the video purge has begun.
    pub fn undo_window_open(&self) -> bool {
        !self.videos_purge_started && !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_matches_wire_names() {
        assert_eq!(DeletionState::SoftDeleted.to_string(), "soft-deleted");
        assert_eq!(DeletionState::DeletingVideos.to_string(), "deleting-videos");
        assert_eq!(
            serde_json::to_string(&DeletionState::DeletingDiary).unwrap(),
            "\"deleting-diary\""
        );
    }

    #[test]
    fn test_linear_transitions() {
        use DeletionState::*;
        assert!(Pending.can_transition_to(SoftDeleted));
        assert!(SoftDeleted.can_transition_to(DeletingVideos));
        assert!(DeletingDiary.can_transition_to(Completed));
        assert!(Failed.can_transition_to(SoftDeleted));
        assert!(!Completed.can_transition_to(SoftDeleted));
        assert!(!DeletingVideos.can_transition_to(SoftDeleted));
        assert!(!DeletingVideos.can_transition_to(Recovered));
    }

    #[test]
    fn test_failed_job_is_terminal_only_without_pending_retry() {
        let mut job = DeletionJob::new("job_1".to_string(), "d1".to_string());
        assert!(job.is_active());
        job.state = DeletionState::Failed;
        job.next_retry_at = Some(Utc::now());
        assert!(job.is_active());
        job.next_retry_at = None;
        assert!(job.is_terminal());
    }

    #[test]
    fn test_undo_window_closes_when_video_purge_starts() {
        let mut job = DeletionJob::new("job_1".to_string(), "d1".to_string());
        job.state = DeletionState::SoftDeleted;
        assert!(job.undo_window_open());
        job.state = DeletionState::DeletingVideos;
        job.videos_purge_started = true;
        assert!(!job.undo_window_open());
    }
}
