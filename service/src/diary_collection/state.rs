use std::collections::HashMap;

use chrono::{DateTime, Utc};
use core_types::{DeletionJob, Diary, DiaryUpdate};

/// What the UI sees of the user's diaries.
#[derive(Debug, Clone, PartialEq)]
pub struct DiariesState {
    /// Visible diaries, most recent first. Never contains soft-deleted ones.
    pub diaries: Vec<Diary>,
    pub loading: bool,
    pub error: Option<String>,
    /// Cleared once for the rest of the session when the store fails
    pub remote_available: bool,
    /// Undo candidate
    pub last_deleted_diary: Option<Diary>,
    pub is_deleting: bool,
    /// Latest snapshot of every job started by this controller
    pub deletion_jobs: HashMap<String, DeletionJob>,
}

impl Default for DiariesState {
    fn default() -> Self {
        Self {
            diaries: Vec::new(),
            loading: true,
            error: None,
            remote_available: true,
            last_deleted_diary: None,
            is_deleting: false,
            deletion_jobs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiariesAction {
    SetDiaries(Vec<Diary>),
    SetLoading(bool),
    SetError(Option<String>),
    EnterDegradedMode,
    SetLastDeletedDiary(Option<Diary>),
    SetIsDeleting(bool),
    UpsertDeletionJob(DeletionJob),
    RemoveDiary(String),
    /// Put a new diary at the front
    AddDiary(Diary),
    /// Put a previously removed diary back at its place by creation time
    RestoreDiary(Diary),
    UpdateDiary {
        diary_id: String,
        update: DiaryUpdate,
        updated_at: DateTime<Utc>,
    },
    IncrementVideoCount(String),
    /// Applied as one change; observers never see a partial batch
    Batch(Vec<DiariesAction>),
}

pub fn reduce(state: &mut DiariesState, action: DiariesAction) {
    match action {
        DiariesAction::SetDiaries(diaries) => {
            state.diaries = diaries.into_iter().filter(|d| !d.is_deleted).collect();
        }
        DiariesAction::SetLoading(loading) => state.loading = loading,
        DiariesAction::SetError(error) => state.error = error,
        DiariesAction::EnterDegradedMode => state.remote_available = false,
        DiariesAction::SetLastDeletedDiary(diary) => state.last_deleted_diary = diary,
        DiariesAction::SetIsDeleting(is_deleting) => state.is_deleting = is_deleting,
        DiariesAction::UpsertDeletionJob(job) => {
            state.deletion_jobs.insert(job.id.clone(), job);
        }
        DiariesAction::RemoveDiary(diary_id) => state.diaries.retain(|d| d.id != diary_id),
        DiariesAction::AddDiary(diary) => {
            state.diaries.retain(|d| d.id != diary.id);
            state.diaries.insert(0, diary);
        }
        DiariesAction::RestoreDiary(diary) => {
            if state.diaries.iter().any(|d| d.id == diary.id) {
                return;
            }
            let position = state
                .diaries
                .iter()
                .position(|d| d.created_at < diary.created_at)
                .unwrap_or(state.diaries.len());
            state.diaries.insert(position, diary);
        }
        DiariesAction::UpdateDiary {
            diary_id,
            update,
            updated_at,
        } => {
            if let Some(diary) = state.diaries.iter_mut().find(|d| d.id == diary_id) {
                diary.apply_update(&update, updated_at);
            }
        }
        DiariesAction::IncrementVideoCount(diary_id) => {
            if let Some(diary) = state.diaries.iter_mut().find(|d| d.id == diary_id) {
                diary.video_count += 1;
            }
        }
        DiariesAction::Batch(actions) => {
            for action in actions {
                reduce(state, action);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_utils::diary;

    fn aged(id: &str, minutes: i64) -> Diary {
        let mut d = diary(id, "u1");
        d.created_at += Duration::minutes(minutes);
        d
    }

    #[test]
    fn test_set_diaries_hides_soft_deleted() {
        let mut state = DiariesState::default();
        let mut deleted = diary("d2", "u1");
        deleted.is_deleted = true;

        reduce(
            &mut state,
            DiariesAction::SetDiaries(vec![diary("d1", "u1"), deleted]),
        );

        assert_eq!(state.diaries.len(), 1);
        assert_eq!(state.diaries[0].id, "d1");
    }

    #[test]
    fn test_add_diary_prepends_without_duplicates() {
        let mut state = DiariesState::default();
        reduce(&mut state, DiariesAction::AddDiary(diary("d1", "u1")));
        reduce(&mut state, DiariesAction::AddDiary(diary("d2", "u1")));
        reduce(&mut state, DiariesAction::AddDiary(diary("d1", "u1")));

        let ids: Vec<&str> = state.diaries.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn test_restore_keeps_most_recent_first_and_is_single_shot() {
        let mut state = DiariesState::default();
        reduce(
            &mut state,
            DiariesAction::SetDiaries(vec![aged("new", 30), aged("old", 0)]),
        );

        reduce(&mut state, DiariesAction::RestoreDiary(aged("mid", 10)));
        reduce(&mut state, DiariesAction::RestoreDiary(aged("mid", 10)));

        let ids: Vec<&str> = state.diaries.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_batch_applies_all_actions() {
        let mut state = DiariesState::default();
        reduce(&mut state, DiariesAction::SetDiaries(vec![diary("d1", "u1")]));

        reduce(
            &mut state,
            DiariesAction::Batch(vec![
                DiariesAction::RemoveDiary("d1".to_string()),
                DiariesAction::SetLastDeletedDiary(Some(diary("d1", "u1"))),
                DiariesAction::SetIsDeleting(true),
            ]),
        );

        assert!(state.diaries.is_empty());
        assert_eq!(state.last_deleted_diary.as_ref().unwrap().id, "d1");
        assert!(state.is_deleting);
    }

    #[test]
    fn test_update_merges_into_listed_diary() {
        let mut state = DiariesState::default();
        reduce(&mut state, DiariesAction::SetDiaries(vec![diary("d1", "u1")]));
        let now = Utc::now();

        reduce(
            &mut state,
            DiariesAction::UpdateDiary {
                diary_id: "d1".to_string(),
                update: DiaryUpdate {
                    description: Some("Summer".to_string()),
                    ..Default::default()
                },
                updated_at: now,
            },
        );

        assert_eq!(state.diaries[0].description, "Summer");
        assert_eq!(state.diaries[0].updated_at, now);
        assert_eq!(state.diaries[0].title, "Diary d1");
    }
}
