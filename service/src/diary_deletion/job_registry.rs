use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use core_types::{DeletionJob, DeletionState};

use crate::{error::Error, scheduler::backoff_delay};

/// Outcome of recording a failed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Run the pipeline again after the delay
    Retry(Duration),
    /// Retries are used up; the job is terminally failed
    Exhausted,
}

struct JobEntry {
    job: DeletionJob,
    watchers: Vec<flume::Sender<DeletionJob>>,
}

impl JobEntry {
    fn publish(&mut self) {
        let snapshot = self.job.clone();
        self.watchers.retain(|w| w.send(snapshot.clone()).is_ok());
    }
}

/// In-memory registry of deletion jobs, owned by the deletion service.
///
/// Every change of a job is published to its watchers as a full snapshot.
/// Watchers are disconnected when the job is removed.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a pending job for the diary and subscribe to it.
    ///
    /// Fails with `DeletionJobActive` while another job of the same diary is
    /// still active.
    pub fn create_job(
        &self,
        diary_id: &str,
    ) -> Result<(DeletionJob, flume::Receiver<DeletionJob>), Error> {
        let mut jobs = self.lock();
        if jobs
            .values()
            .any(|entry| entry.job.diary_id == diary_id && entry.job.is_active())
        {
            return Err(Error::DeletionJobActive(diary_id.to_string()));
        }

        let job_id = format!(
            "job_{}_{}",
            Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let job = DeletionJob::new(job_id.clone(), diary_id.to_string());
        let (sender, receiver) = flume::unbounded();
        let _ = sender.send(job.clone());
        jobs.insert(
            job_id,
            JobEntry {
                job: job.clone(),
                watchers: vec![sender],
            },
        );
        Ok((job, receiver))
    }

    pub fn get_job(&self, job_id: &str) -> Option<DeletionJob> {
        self.lock().get(job_id).map(|entry| entry.job.clone())
    }

    pub fn active_job_for_diary(&self, diary_id: &str) -> Option<DeletionJob> {
        self.lock()
            .values()
            .find(|entry| entry.job.diary_id == diary_id && entry.job.is_active())
            .map(|entry| entry.job.clone())
    }

    pub fn jobs(&self) -> Vec<DeletionJob> {
        let mut jobs: Vec<DeletionJob> = self.lock().values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    /// Subscribe to further snapshots. The current snapshot is delivered first.
    pub fn subscribe(&self, job_id: &str) -> Option<flume::Receiver<DeletionJob>> {
        let mut jobs = self.lock();
        let entry = jobs.get_mut(job_id)?;
        let (sender, receiver) = flume::unbounded();
        let _ = sender.send(entry.job.clone());
        entry.watchers.push(sender);
        Some(receiver)
    }

    /// Fails with `DeletionRecovered` once the job was recovered.
    pub fn ensure_running(&self, job_id: &str) -> Result<(), Error> {
        let jobs = self.lock();
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        if entry.job.state == DeletionState::Recovered {
            return Err(Error::DeletionRecovered);
        }
        Ok(())
    }

    /// Move a running job to `next`.
    ///
    /// Entering `DeletingVideos` closes the undo window. Entering
    /// `SoftDeleted` clears any error and pending retry of a previous run.
    pub fn transition(&self, job_id: &str, next: DeletionState) -> Result<DeletionJob, Error> {
        let mut jobs = self.lock();
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        let job = &mut entry.job;

        if job.state == DeletionState::Recovered {
            return Err(Error::DeletionRecovered);
        }
        if !job.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition(format!(
                "{} -> {} for job {}",
                job.state, next, job_id
            )));
        }

        job.state = next;
        job.updated_at = Utc::now();
        match next {
            DeletionState::SoftDeleted => {
                job.error = None;
                job.next_retry_at = None;
            }
            DeletionState::DeletingVideos => job.videos_purge_started = true,
            _ => {}
        }
        tracing::debug!(job_id, state = %next, "Deletion job transitioned");

        let snapshot = job.clone();
        entry.publish();
        Ok(snapshot)
    }

    /// Record a failed run. Below `max_retries` the retry count is bumped
    /// and a backoff returned; at the limit the job becomes terminal.
    pub fn record_failure(
        &self,
        job_id: &str,
        error: &Error,
        max_retries: u32,
    ) -> Result<FailureOutcome, Error> {
        let mut jobs = self.lock();
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        let job = &mut entry.job;

        if job.state == DeletionState::Recovered {
            return Err(Error::DeletionRecovered);
        }

        let now = Utc::now();
        job.state = DeletionState::Failed;
        job.updated_at = now;

        let outcome = if job.retry_count < max_retries {
            job.retry_count += 1;
            let delay = backoff_delay(job.retry_count);
            job.error = Some(error.to_string());
            job.next_retry_at = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .or(Some(now));
            FailureOutcome::Retry(delay)
        } else {
            job.error = Some(format!("Failed after {} retries: {}", job.retry_count, error));
            job.next_retry_at = None;
            FailureOutcome::Exhausted
        };

        entry.publish();
        Ok(outcome)
    }

    /// Stop a job so that recovery can restore the diary.
    ///
    /// Refused with `UndoWindowClosed` once the video purge has begun or the
    /// job has completed. Recovering twice is not an error.
    pub fn mark_recovered(&self, job_id: &str) -> Result<DeletionJob, Error> {
        let mut jobs = self.lock();
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        let job = &mut entry.job;

        if job.state == DeletionState::Recovered {
            return Ok(job.clone());
        }
        if job.videos_purge_started || !job.state.can_transition_to(DeletionState::Recovered) {
            return Err(Error::UndoWindowClosed(job.diary_id.clone()));
        }

        job.state = DeletionState::Recovered;
        job.next_retry_at = None;
        job.updated_at = Utc::now();

        let snapshot = job.clone();
        entry.publish();
        Ok(snapshot)
    }

    /// Drop a terminal job. Active jobs are kept.
    pub fn prune(&self, job_id: &str) -> bool {
        let mut jobs = self.lock();
        match jobs.get(job_id) {
            Some(entry) if entry.job.is_terminal() => {
                jobs.remove(job_id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &flume::Receiver<DeletionJob>) -> Vec<DeletionState> {
        receiver.try_iter().map(|job| job.state).collect()
    }

    #[test]
    fn test_second_active_job_for_diary_is_rejected() {
        let registry = JobRegistry::new();
        registry.create_job("d1").unwrap();

        let second = registry.create_job("d1");

        assert_eq!(second.unwrap_err(), Error::DeletionJobActive("d1".to_string()));
        assert!(registry.create_job("d2").is_ok());
        assert_eq!(registry.jobs().len(), 2);
    }

    #[test]
    fn test_new_job_allowed_after_previous_one_settled() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();
        registry.mark_recovered(&job.id).unwrap();

        assert!(registry.create_job("d1").is_ok());
    }

    #[test]
    fn test_transitions_are_published_in_order() {
        let registry = JobRegistry::new();
        let (job, updates) = registry.create_job("d1").unwrap();

        registry.transition(&job.id, DeletionState::SoftDeleted).unwrap();
        registry.transition(&job.id, DeletionState::DeletingVideos).unwrap();

        assert_eq!(
            drain(&updates),
            vec![
                DeletionState::Pending,
                DeletionState::SoftDeleted,
                DeletionState::DeletingVideos
            ]
        );
        assert!(registry.get_job(&job.id).unwrap().videos_purge_started);
    }

    #[test]
    fn test_out_of_order_transition_is_rejected() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();

        let result = registry.transition(&job.id, DeletionState::DeletingDiary);

        assert!(matches!(result, Err(Error::InvalidStateTransition(_))));
        assert_eq!(registry.get_job(&job.id).unwrap().state, DeletionState::Pending);
    }

    #[test]
    fn test_failures_retry_until_limit() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();
        let error = Error::DbError("offline".to_string());

        let outcomes: Vec<FailureOutcome> = (0..4)
            .map(|_| registry.record_failure(&job.id, &error, 3).unwrap())
            .collect();

        assert_eq!(
            outcomes,
            vec![
                FailureOutcome::Retry(Duration::from_secs(2)),
                FailureOutcome::Retry(Duration::from_secs(4)),
                FailureOutcome::Retry(Duration::from_secs(8)),
                FailureOutcome::Exhausted,
            ]
        );
        let job = registry.get_job(&job.id).unwrap();
        assert_eq!(job.retry_count, 3);
        assert!(job.is_terminal());
        assert_eq!(
            job.error.as_deref(),
            Some("Failed after 3 retries: Database error: offline")
        );
    }

    #[test]
    fn test_retry_reentry_clears_error() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();
        registry
            .record_failure(&job.id, &Error::DbError("offline".to_string()), 3)
            .unwrap();
        assert!(registry.get_job(&job.id).unwrap().is_active());

        let job = registry.transition(&job.id, DeletionState::SoftDeleted).unwrap();

        assert_eq!(job.error, None);
        assert_eq!(job.next_retry_at, None);
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn test_recovered_job_stops_pipeline() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();
        registry.transition(&job.id, DeletionState::SoftDeleted).unwrap();

        registry.mark_recovered(&job.id).unwrap();

        assert_eq!(
            registry.transition(&job.id, DeletionState::DeletingVideos),
            Err(Error::DeletionRecovered)
        );
        assert_eq!(registry.ensure_running(&job.id), Err(Error::DeletionRecovered));
        assert_eq!(
            registry.record_failure(&job.id, &Error::NothingToUndo, 3),
            Err(Error::DeletionRecovered)
        );
    }

    #[test]
    fn test_recovery_refused_once_videos_are_purged() {
        let registry = JobRegistry::new();
        let (job, _) = registry.create_job("d1").unwrap();
        registry.transition(&job.id, DeletionState::SoftDeleted).unwrap();
        registry.transition(&job.id, DeletionState::DeletingVideos).unwrap();

        let result = registry.mark_recovered(&job.id);

        assert_eq!(result, Err(Error::UndoWindowClosed("d1".to_string())));
    }

    #[test]
    fn test_prune_keeps_active_jobs_and_closes_watchers() {
        let registry = JobRegistry::new();
        let (job, updates) = registry.create_job("d1").unwrap();

        assert!(!registry.prune(&job.id));
        registry.mark_recovered(&job.id).unwrap();
        assert!(registry.prune(&job.id));

        assert!(registry.get_job(&job.id).is_none());
        drain(&updates);
        assert!(updates.recv().is_err());
    }
}
