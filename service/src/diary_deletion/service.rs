use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cloud_storage::CloudStorageOps;
use core_types::{DeletionJob, DeletionState};
use database::DocumentStoreOps;

use crate::{
    diary_deletion::{
        context::DeletionContext,
        job_registry::{FailureOutcome, JobRegistry},
    },
    error::Error,
    pipeline::Pipeline,
    scheduler::{AsyncStdScheduler, Scheduler},
    settings::Settings,
    task_queue::SerialTaskQueue,
};

/// A started deletion job and the stream of its snapshots.
///
/// The stream starts with the pending job and ends when the job is pruned.
pub struct DeletionHandle {
    pub job_id: String,
    pub updates: flume::Receiver<DeletionJob>,
}

struct DeletionServiceInner {
    store: Arc<dyn DocumentStoreOps>,
    cloud_storage: Arc<dyn CloudStorageOps>,
    registry: Arc<JobRegistry>,
    queue: SerialTaskQueue,
    scheduler: Arc<dyn Scheduler>,
    settings: Arc<Settings>,
    /// Queued runs plus pending retry and prune timers
    work_in_flight: AtomicUsize,
}

/// Runs diary deletions in the background, one job at a time.
///
/// A job soft-deletes the diary, purges its videos in batches, removes its
/// blobs and finally deletes the diary document. Failed runs are retried
/// from the start with exponential backoff. Settled jobs stay in the
/// registry for a grace period.
#[derive(Clone)]
pub struct DiaryDeletionService {
    inner: Arc<DeletionServiceInner>,
}

impl DiaryDeletionService {
    pub fn new(
        store: Arc<dyn DocumentStoreOps>,
        cloud_storage: Arc<dyn CloudStorageOps>,
        settings: Arc<Settings>,
    ) -> Self {
        Self::with_scheduler(store, cloud_storage, settings, Arc::new(AsyncStdScheduler))
    }

    pub fn with_scheduler(
        store: Arc<dyn DocumentStoreOps>,
        cloud_storage: Arc<dyn CloudStorageOps>,
        settings: Arc<Settings>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(DeletionServiceInner {
                store,
                cloud_storage,
                registry: Arc::new(JobRegistry::new()),
                queue: SerialTaskQueue::new(),
                scheduler,
                settings,
                work_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.inner.settings)
    }

    /// Create a job for the diary and queue it. Returns without waiting for
    /// any remote call.
    #[tracing::instrument(skip(self), err)]
    pub fn execute_deletion(&self, diary_id: &str, owner_id: &str) -> Result<DeletionHandle, Error> {
        let (job, updates) = self.inner.registry.create_job(diary_id)?;
        tracing::info!(job_id = %job.id, "Deletion job queued");
        self.enqueue_run(job.id.clone(), diary_id.to_string(), owner_id.to_string());
        Ok(DeletionHandle {
            job_id: job.id,
            updates,
        })
    }

    pub fn get_job(&self, job_id: &str) -> Option<DeletionJob> {
        self.inner.registry.get_job(job_id)
    }

    pub fn subscribe(&self, job_id: &str) -> Option<flume::Receiver<DeletionJob>> {
        self.inner.registry.subscribe(job_id)
    }

    /// Resolves with the first terminal snapshot of the job.
    pub async fn wait_for_settled(&self, job_id: &str) -> Result<DeletionJob, Error> {
        let updates = self
            .subscribe(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        while let Ok(job) = updates.recv_async().await {
            if job.is_terminal() {
                return Ok(job);
            }
        }
        Err(Error::JobNotFound(job_id.to_string()))
    }

    /// Resolves once every run queued so far has finished.
    pub async fn flush(&self) {
        self.inner.queue.flush().await;
    }

    /// Resolves once no run is queued and no retry or prune timer is pending.
    /// Never resolves while a timer is parked on a scheduler that holds it.
    pub async fn wait_until_idle(&self) {
        loop {
            self.flush().await;
            if self.inner.work_in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            async_std::task::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Clear the soft-delete flag of a diary whose deletion is still undoable.
    ///
    /// An active job is stopped first; the pipeline sees it at its next state
    /// change and reverts its own soft-delete if that raced this call. Fails
    /// with `UndoWindowClosed` once the video purge of the diary has begun.
    #[tracing::instrument(skip(self), err)]
    pub async fn recover_diary(&self, diary_id: &str) -> Result<(), Error> {
        let registry = &self.inner.registry;
        if let Some(job) = registry.active_job_for_diary(diary_id) {
            registry.mark_recovered(&job.id)?;
            tracing::info!(job_id = %job.id, "Deletion job stopped for recovery");
        } else if registry
            .jobs()
            .iter()
            .any(|job| job.diary_id == diary_id && job.videos_purge_started)
        {
            return Err(Error::UndoWindowClosed(diary_id.to_string()));
        }

        self.inner.store.set_diary_deleted(diary_id, false).await?;
        tracing::info!("Diary recovered");
        Ok(())
    }

    fn enqueue_run(&self, job_id: String, diary_id: String, owner_id: String) {
        let service = self.clone();
        self.inner.work_in_flight.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.enqueue(move || async move {
            service.run_job(job_id, diary_id, owner_id).await;
            service.inner.work_in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn run_job(&self, job_id: String, diary_id: String, owner_id: String) {
        let started = Instant::now();
        let settings = Arc::clone(&self.inner.settings);
        let mut context = DeletionContext::new(
            job_id.clone(),
            diary_id.clone(),
            owner_id.clone(),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.cloud_storage),
            Arc::clone(&self.inner.registry),
            Arc::clone(&settings),
        );

        let result = Pipeline::<DeletionContext>::new().execute(&mut context).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match result {
            Ok(()) => self
                .inner
                .registry
                .transition(&job_id, DeletionState::Completed)
                .map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    diary_id = %diary_id,
                    videos = context.videos_deleted,
                    blobs = context.blobs_deleted,
                    elapsed_ms,
                    "Diary deletion completed"
                );
                self.schedule_prune(job_id, settings.completed_job_grace);
            }
            Err(Error::DeletionRecovered) => {
                self.finish_recovered(&context, elapsed_ms).await;
                self.schedule_prune(job_id, settings.completed_job_grace);
            }
            Err(error) => {
                match self
                    .inner
                    .registry
                    .record_failure(&job_id, &error, settings.max_retries)
                {
                    Ok(FailureOutcome::Retry(delay)) => {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %error,
                            delay_secs = delay.as_secs(),
                            elapsed_ms,
                            "Deletion run failed, retrying"
                        );
                        self.schedule_retry(job_id, diary_id, owner_id, delay);
                    }
                    Ok(FailureOutcome::Exhausted) => {
                        tracing::error!(
                            job_id = %job_id,
                            error = %error,
                            elapsed_ms,
                            "Deletion failed, retries exhausted"
                        );
                        self.schedule_prune(job_id, settings.failed_job_grace);
                    }
                    Err(Error::DeletionRecovered) => {
                        self.finish_recovered(&context, elapsed_ms).await;
                        self.schedule_prune(job_id, settings.completed_job_grace);
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Could not record deletion failure");
                    }
                }
            }
        }
    }

    /// Undo this run's own soft-delete when recovery raced it.
    async fn finish_recovered(&self, context: &DeletionContext, elapsed_ms: u64) {
        if context.soft_delete_applied {
            match self
                .inner
                .store
                .set_diary_deleted(&context.diary_id, false)
                .await
            {
                Ok(()) => {
                    tracing::info!(diary_id = %context.diary_id, "Reverted soft delete after recovery")
                }
                Err(e) => tracing::error!(
                    diary_id = %context.diary_id,
                    error = %e,
                    "Failed to revert soft delete after recovery"
                ),
            }
        }
        tracing::info!(job_id = %context.job_id, elapsed_ms, "Deletion stopped by recovery");
    }

    fn schedule_retry(&self, job_id: String, diary_id: String, owner_id: String, delay: Duration) {
        let service = self.clone();
        self.spawn_timer(delay, move || service.enqueue_run(job_id, diary_id, owner_id));
    }

    fn schedule_prune(&self, job_id: String, grace: Duration) {
        let registry = Arc::clone(&self.inner.registry);
        self.spawn_timer(grace, move || {
            if registry.prune(&job_id) {
                tracing::debug!(job_id = %job_id, "Deletion job pruned");
            }
        });
    }

    fn spawn_timer(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        inner.work_in_flight.fetch_add(1, Ordering::SeqCst);
        async_std::task::spawn(async move {
            inner.scheduler.sleep(delay).await;
            action();
            inner.work_in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use cloud_storage::mock::MockCloudStorage;
    use database::mock::{MockDocumentStore, StoreOperation};

    use super::*;
    use crate::{
        scheduler::mock::TestScheduler,
        test_utils::{diary, wait_until},
    };

    struct Fixture {
        store: MockDocumentStore,
        storage: MockCloudStorage,
        scheduler: TestScheduler,
        service: DiaryDeletionService,
    }

    fn fixture(scheduler: TestScheduler) -> Fixture {
        let store = MockDocumentStore::new();
        store.add_diary(diary("d1", "u1"));
        store.add_videos("d1", 2);
        let storage = MockCloudStorage::new();
        storage.add_file_dummy("diaries/u1/d1/cover");
        let service = DiaryDeletionService::with_scheduler(
            Arc::new(store.clone()),
            Arc::new(storage.clone()),
            Arc::new(Settings::default()),
            Arc::new(scheduler.clone()),
        );
        Fixture {
            store,
            storage,
            scheduler,
            service,
        }
    }

    #[async_std::test]
    async fn test_deletion_completes_and_is_pruned_after_grace() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        let job = f.service.wait_for_settled(&handle.job_id).await.unwrap();

        assert_eq!(job.state, DeletionState::Completed);
        assert!(f.store.diary("d1").is_none());
        assert_eq!(f.store.video_count_for("d1"), 0);
        assert_eq!(f.storage.uploaded_count(), 0);
        assert!(f.service.get_job(&handle.job_id).is_some());

        f.scheduler.release_held();
        f.service.wait_until_idle().await;
        assert!(f.service.get_job(&handle.job_id).is_none());
        assert_eq!(f.scheduler.delays(), vec![Duration::from_secs(60)]);
    }

    #[async_std::test]
    async fn test_job_walks_states_in_order() {
        let f = fixture(TestScheduler::new());

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        f.service.wait_until_idle().await;

        let states: Vec<DeletionState> = handle.updates.try_iter().map(|j| j.state).collect();
        assert_eq!(
            states,
            vec![
                DeletionState::Pending,
                DeletionState::SoftDeleted,
                DeletionState::DeletingVideos,
                DeletionState::DeletingStorage,
                DeletionState::DeletingDiary,
                DeletionState::Completed,
            ]
        );
    }

    #[async_std::test]
    async fn test_retry_cap_with_always_failing_store() {
        let f = fixture(TestScheduler::new());
        f.store.fail_always(StoreOperation::SoftDelete);

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        f.service.wait_until_idle().await;

        let last = handle.updates.try_iter().last().unwrap();
        assert_eq!(last.state, DeletionState::Failed);
        assert_eq!(last.retry_count, 3);
        assert!(last.is_terminal());
        assert!(last.error.unwrap().starts_with("Failed after 3 retries"));
        assert_eq!(f.store.call_count(StoreOperation::SoftDelete), 4);
        assert_eq!(
            f.scheduler.delays(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(3600),
            ]
        );
        assert!(f.service.get_job(&handle.job_id).is_none());
    }

    #[async_std::test]
    async fn test_transient_failure_is_retried_from_soft_delete() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));
        f.store.fail_times(StoreOperation::GetVideoIds, 1);

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        let job = f.service.wait_for_settled(&handle.job_id).await.unwrap();

        assert_eq!(job.state, DeletionState::Completed);
        assert_eq!(job.retry_count, 1);
        assert_eq!(f.store.call_count(StoreOperation::SoftDelete), 2);
        assert!(f.store.diary("d1").is_none());
    }

    #[async_std::test]
    async fn test_second_deletion_of_same_diary_is_rejected() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));
        f.store.hold(StoreOperation::SoftDelete);

        let first = f.service.execute_deletion("d1", "u1");
        let second = f.service.execute_deletion("d1", "u1");

        assert!(first.is_ok());
        assert_eq!(second.err(), Some(Error::DeletionJobActive("d1".to_string())));
        assert_eq!(f.service.registry().jobs().len(), 1);
        f.store.release(StoreOperation::SoftDelete);
        f.service.flush().await;
    }

    #[async_std::test]
    async fn test_recovery_racing_soft_delete_leaves_diary_restored() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));
        f.store.hold(StoreOperation::SoftDelete);

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        wait_until(|| f.store.call_count(StoreOperation::SoftDelete) == 1).await;
        f.service.recover_diary("d1").await.unwrap();
        f.store.release(StoreOperation::SoftDelete);
        f.service.flush().await;

        let diary = f.store.diary("d1").unwrap();
        assert!(!diary.is_deleted);
        assert_eq!(f.store.video_count_for("d1"), 2);
        assert_eq!(f.store.call_count(StoreOperation::GetVideoIds), 0);
        assert_eq!(
            f.service.get_job(&handle.job_id).unwrap().state,
            DeletionState::Recovered
        );
    }

    #[async_std::test]
    async fn test_recovery_refused_once_videos_are_purging() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));
        f.store.hold(StoreOperation::CommitBatch);

        let handle = f.service.execute_deletion("d1", "u1").unwrap();
        wait_until(|| f.store.call_count(StoreOperation::CommitBatch) == 1).await;
        let result = f.service.recover_diary("d1").await;
        f.store.release(StoreOperation::CommitBatch);

        assert_eq!(result, Err(Error::UndoWindowClosed("d1".to_string())));
        let job = f.service.wait_for_settled(&handle.job_id).await.unwrap();
        assert_eq!(job.state, DeletionState::Completed);
    }

    #[async_std::test]
    async fn test_jobs_run_one_at_a_time() {
        let f = fixture(TestScheduler::holding_at_least(Duration::from_secs(60)));
        f.store.add_diary(diary("d2", "u1"));
        f.store.hold(StoreOperation::SoftDelete);

        let first = f.service.execute_deletion("d1", "u1").unwrap();
        let second = f.service.execute_deletion("d2", "u1").unwrap();
        wait_until(|| f.store.call_count(StoreOperation::SoftDelete) == 1).await;
        async_std::task::sleep(Duration::from_millis(5)).await;

        assert_eq!(f.store.call_count(StoreOperation::SoftDelete), 1);
        assert_eq!(
            f.service.get_job(&second.job_id).unwrap().state,
            DeletionState::Pending
        );

        f.store.release(StoreOperation::SoftDelete);
        assert_eq!(
            f.service.wait_for_settled(&first.job_id).await.unwrap().state,
            DeletionState::Completed
        );
        assert_eq!(
            f.service.wait_for_settled(&second.job_id).await.unwrap().state,
            DeletionState::Completed
        );
    }
}
