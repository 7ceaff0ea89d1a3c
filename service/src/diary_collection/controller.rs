use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use cloud_storage::CloudStorageOps;
use core_types::{
    DeletionJob, DeletionState, Diary, DiaryUpdate, DiaryVideo, NewDiary, NewDiaryVideo,
};
use database::DocumentStoreOps;

use crate::{
    diary_cache::DiaryCache,
    diary_collection::state::{DiariesAction, DiariesState, reduce},
    diary_deletion::{DeletionHandle, DiaryDeletionService},
    error::Error,
    scheduler::Scheduler,
    settings::Settings,
};

const LOAD_FAILED_MESSAGE: &str = "Missing or insufficient permissions - using local storage";
const WRITE_FAILED_MESSAGE: &str = "Permission error - using local storage";

/// Cover image picked by the user.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
}

struct ControllerState {
    view: DiariesState,
    /// Job holding the deletion gate, if a remote deletion holds it
    gate_job: Option<String>,
    watchers: Vec<flume::Sender<DiariesState>>,
}

struct ControllerInner {
    principal: Option<String>,
    store: Arc<dyn DocumentStoreOps>,
    cloud_storage: Arc<dyn CloudStorageOps>,
    cache: DiaryCache,
    deletion: DiaryDeletionService,
    scheduler: Arc<dyn Scheduler>,
    settings: Arc<Settings>,
    state: Mutex<ControllerState>,
    last_local_id: AtomicI64,
}

/// Single owner of the UI's list of diaries.
///
/// Mutations are applied to the in-memory state first and reconciled with
/// the remote store afterwards. When the store fails the controller switches
/// to the local cache for the rest of the session.
#[derive(Clone)]
pub struct DiaryCollectionController {
    inner: Arc<ControllerInner>,
}

impl DiaryCollectionController {
    /// `principal` is the signed-in user. Without one every operation fails
    /// or yields nothing.
    pub fn new(
        principal: Option<String>,
        store: Arc<dyn DocumentStoreOps>,
        cloud_storage: Arc<dyn CloudStorageOps>,
        cache: DiaryCache,
        deletion: DiaryDeletionService,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let settings = deletion.settings();
        Self {
            inner: Arc::new(ControllerInner {
                principal,
                store,
                cloud_storage,
                cache,
                deletion,
                scheduler,
                settings,
                state: Mutex::new(ControllerState {
                    view: DiariesState::default(),
                    gate_job: None,
                    watchers: Vec::new(),
                }),
                last_local_id: AtomicI64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(state: &mut ControllerState) {
        let snapshot = state.view.clone();
        state.watchers.retain(|w| w.send(snapshot.clone()).is_ok());
    }

    fn dispatch(&self, action: DiariesAction) {
        let mut state = self.lock();
        reduce(&mut state.view, action);
        Self::publish(&mut state);
    }

    fn principal(&self) -> Result<&str, Error> {
        self.inner
            .principal
            .as_deref()
            .ok_or(Error::Unauthenticated)
    }

    fn degrade(&self, message: &str, error: &Error) {
        tracing::warn!(error = %error, "Remote store failed, switching to local storage");
        self.dispatch(DiariesAction::Batch(vec![
            DiariesAction::SetError(Some(message.to_string())),
            DiariesAction::EnterDegradedMode,
        ]));
    }

    pub fn state(&self) -> DiariesState {
        self.lock().view.clone()
    }

    /// Every later state change is delivered as a full snapshot.
    pub fn subscribe(&self) -> flume::Receiver<DiariesState> {
        let (sender, receiver) = flume::unbounded();
        self.lock().watchers.push(sender);
        receiver
    }

    pub fn diaries(&self) -> Vec<Diary> {
        self.lock().view.diaries.clone()
    }

    pub fn loading(&self) -> bool {
        self.lock().view.loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().view.error.clone()
    }

    pub fn last_deleted_diary(&self) -> Option<Diary> {
        self.lock().view.last_deleted_diary.clone()
    }

    pub fn is_deleting(&self) -> bool {
        self.lock().view.is_deleting
    }

    pub fn is_remote_available(&self) -> bool {
        self.lock().view.remote_available
    }

    /// Fetch the owner's diaries from the store, or from the local cache
    /// once the store has failed.
    #[tracing::instrument(skip(self), err)]
    pub async fn load(&self, owner_id: &str) -> Result<Vec<Diary>, Error> {
        self.dispatch(DiariesAction::Batch(vec![
            DiariesAction::SetLoading(true),
            DiariesAction::SetError(None),
        ]));

        if !self.is_remote_available() {
            return Ok(self.load_local(owner_id));
        }

        match self.inner.store.get_diaries_by_owner(owner_id).await {
            Ok(diaries) => {
                let active: Vec<Diary> = diaries.into_iter().filter(|d| !d.is_deleted).collect();
                let last_deleted = self.inner.cache.last_deleted();
                self.dispatch(DiariesAction::Batch(vec![
                    DiariesAction::SetDiaries(active.clone()),
                    DiariesAction::SetLastDeletedDiary(last_deleted),
                    DiariesAction::SetLoading(false),
                ]));
                tracing::debug!(count = active.len(), "Diaries loaded");
                Ok(active)
            }
            Err(e) => {
                self.degrade(LOAD_FAILED_MESSAGE, &e.into());
                Ok(self.load_local(owner_id))
            }
        }
    }

    fn load_local(&self, owner_id: &str) -> Vec<Diary> {
        let diaries = self.inner.cache.diaries_for_owner(owner_id);
        self.dispatch(DiariesAction::Batch(vec![
            DiariesAction::SetDiaries(diaries.clone()),
            DiariesAction::SetLoading(false),
        ]));
        diaries
    }

    /// Re-run `load` for the signed-in user.
    pub async fn refresh(&self) -> Result<Vec<Diary>, Error> {
        match self.inner.principal.clone() {
            Some(owner_id) => self.load(&owner_id).await,
            None => {
                self.dispatch(DiariesAction::Batch(vec![
                    DiariesAction::SetDiaries(Vec::new()),
                    DiariesAction::SetLoading(false),
                ]));
                Ok(Vec::new())
            }
        }
    }

    fn validate_title(&self, title: &str) -> Result<(), Error> {
        let length = title.trim().chars().count();
        if length == 0 {
            return Err(Error::InvalidInput("Title is required".to_string()));
        }
        if length > self.inner.settings.max_title_length {
            return Err(Error::InvalidInput(format!(
                "Title must be at most {} characters",
                self.inner.settings.max_title_length
            )));
        }
        Ok(())
    }

    async fn upload_cover(&self, owner_id: &str, cover: &CoverImage) -> Result<String, Error> {
        let key = format!("diaries/{}/{}_cover", owner_id, Utc::now().timestamp_millis());
        self.inner.cloud_storage.upload_file(&key, &cover.bytes).await?;
        Ok(self.inner.cloud_storage.get_url(&key).await?)
    }

    /// Monotonic id for diaries created while the store is unreachable
    fn next_local_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.inner.last_local_id.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.inner.last_local_id.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return format!("diary_{}", next),
                Err(current) => last = current,
            }
        }
    }

    #[tracing::instrument(skip(self, description, cover), err)]
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        cover: Option<CoverImage>,
        is_private: bool,
    ) -> Result<Diary, Error> {
        let owner_id = self.principal()?.to_string();
        self.validate_title(title)?;

        if self.is_remote_available() {
            match self
                .create_remote(&owner_id, title, description, cover.as_ref(), is_private)
                .await
            {
                Ok(diary) => {
                    self.dispatch(DiariesAction::AddDiary(diary.clone()));
                    tracing::info!(diary_id = %diary.id, "Diary created");
                    return Ok(diary);
                }
                Err(e) => self.degrade(WRITE_FAILED_MESSAGE, &e),
            }
        }

        let now = Utc::now();
        let diary = Diary {
            id: self.next_local_id(),
            owner_id,
            title: title.to_string(),
            description: description.to_string(),
            cover_image_url: String::new(),
            is_private,
            video_count: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            start_time: None,
        };
        self.dispatch(DiariesAction::AddDiary(diary.clone()));
        self.inner.cache.prepend_diary(&diary);
        tracing::info!(diary_id = %diary.id, "Diary created locally");
        Ok(diary)
    }

    async fn create_remote(
        &self,
        owner_id: &str,
        title: &str,
        description: &str,
        cover: Option<&CoverImage>,
        is_private: bool,
    ) -> Result<Diary, Error> {
        let cover_image_url = match cover {
            Some(cover) => self.upload_cover(owner_id, cover).await?,
            None => String::new(),
        };
        let new_diary = NewDiary {
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            cover_image_url,
            is_private,
        };
        Ok(self.inner.store.create_diary(&new_diary).await?)
    }

    /// Merge `update` into the diary. A new cover is uploaded first and its
    /// URL merged into the update. Succeeds once the local change applied.
    #[tracing::instrument(skip(self, update, new_cover), err)]
    pub async fn update(
        &self,
        diary_id: &str,
        update: DiaryUpdate,
        new_cover: Option<CoverImage>,
    ) -> Result<(), Error> {
        self.principal()?;
        if let Some(title) = &update.title {
            self.validate_title(title)?;
        }

        if self.is_remote_available() {
            let mut remote_update = update.clone();
            match self
                .update_remote(diary_id, &mut remote_update, new_cover.as_ref())
                .await
            {
                Ok(()) => {
                    self.dispatch(DiariesAction::UpdateDiary {
                        diary_id: diary_id.to_string(),
                        update: remote_update,
                        updated_at: Utc::now(),
                    });
                    return Ok(());
                }
                Err(e) if e.is_remote_failure() => self.degrade(WRITE_FAILED_MESSAGE, &e),
                Err(e) => {
                    tracing::warn!(error = %e, "Diary not in remote store, updating locally");
                }
            }
        }

        let updated_at = Utc::now();
        self.dispatch(DiariesAction::UpdateDiary {
            diary_id: diary_id.to_string(),
            update: update.clone(),
            updated_at,
        });
        self.inner.cache.update_diary(diary_id, &update, updated_at);
        Ok(())
    }

    async fn update_remote(
        &self,
        diary_id: &str,
        update: &mut DiaryUpdate,
        new_cover: Option<&CoverImage>,
    ) -> Result<(), Error> {
        if let Some(cover) = new_cover {
            let diary = self
                .inner
                .store
                .get_diary(diary_id)
                .await?
                .ok_or_else(|| Error::NotFound(diary_id.to_string()))?;
            update.cover_image_url = Some(self.upload_cover(&diary.owner_id, cover).await?);
        }
        if update.is_empty() {
            return Ok(());
        }
        Ok(self.inner.store.update_diary(diary_id, update).await?)
    }

    /// Add a video to a diary, locally when the store is unreachable.
    #[tracing::instrument(skip(self), err)]
    pub async fn add_video(
        &self,
        diary_id: &str,
        video_url: &str,
        duration: f64,
    ) -> Result<DiaryVideo, Error> {
        let owner_id = self.principal()?.to_string();
        let order_index = self
            .diaries()
            .iter()
            .find(|d| d.id == diary_id)
            .map(|d| d.video_count as i64)
            .unwrap_or(0);
        let new_video = NewDiaryVideo {
            diary_id: diary_id.to_string(),
            owner_id: owner_id.clone(),
            video_url: video_url.to_string(),
            thumbnail_url: String::new(),
            duration,
            order_index,
        };

        if self.is_remote_available() {
            match self.inner.store.add_video(&new_video).await {
                Ok(video) => {
                    self.dispatch(DiariesAction::IncrementVideoCount(diary_id.to_string()));
                    return Ok(video);
                }
                Err(e) => {
                    let e: Error = e.into();
                    if !e.is_remote_failure() {
                        return Err(e);
                    }
                    self.degrade(WRITE_FAILED_MESSAGE, &e);
                }
            }
        }

        let video = DiaryVideo {
            id: format!("video_{}", uuid::Uuid::new_v4().simple()),
            diary_id: new_video.diary_id,
            owner_id,
            video_url: new_video.video_url,
            thumbnail_url: new_video.thumbnail_url,
            duration,
            order_index,
            created_at: Utc::now(),
        };
        self.inner.cache.add_video(&video);
        self.dispatch(DiariesAction::IncrementVideoCount(diary_id.to_string()));
        Ok(video)
    }

    /// Remove the diary from the list at once and delete it in the background.
    ///
    /// Returns the id of the started deletion job, or `None` when the diary
    /// was deleted from the local cache only. Rejected while any deletion of
    /// this controller is in flight.
    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, diary_id: &str) -> Result<Option<String>, Error> {
        let owner_id = self.principal()?.to_string();

        let diary = {
            let mut state = self.lock();
            if state.view.is_deleting {
                return Err(Error::DeletionInProgress);
            }
            let mut diary = state
                .view
                .diaries
                .iter()
                .find(|d| d.id == diary_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(diary_id.to_string()))?;
            diary.start_time = Some(Instant::now());
            reduce(
                &mut state.view,
                DiariesAction::Batch(vec![
                    DiariesAction::SetIsDeleting(true),
                    DiariesAction::RemoveDiary(diary_id.to_string()),
                    DiariesAction::SetLastDeletedDiary(Some(diary.clone())),
                ]),
            );
            state.gate_job = None;
            Self::publish(&mut state);
            diary
        };

        // Let observers render the optimistic removal before the heavy work
        async_std::task::yield_now().await;

        self.inner.cache.archive(&diary);
        tracing::debug!(elapsed_ms = elapsed_ms(&diary), "Diary archived");

        if !self.is_remote_available() {
            self.delete_locally(diary_id).await;
            self.dispatch(DiariesAction::SetIsDeleting(false));
            tracing::info!(elapsed_ms = elapsed_ms(&diary), "Diary deleted locally");
            return Ok(None);
        }

        match self.inner.deletion.execute_deletion(diary_id, &owner_id) {
            Ok(DeletionHandle { job_id, updates }) => {
                self.lock().gate_job = Some(job_id.clone());
                self.spawn_job_monitor(updates, diary.clone());
                self.spawn_watchdog(job_id.clone());
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = elapsed_ms(&diary),
                    "Deletion handed off"
                );
                Ok(Some(job_id))
            }
            Err(e) => {
                self.roll_back_deletion(&diary, &e, true);
                Err(e)
            }
        }
    }

    async fn delete_locally(&self, diary_id: &str) {
        let settings = &self.inner.settings;
        let diaries = self.inner.cache.diaries();

        let remaining: Vec<Diary> = if diaries.len() > settings.local_chunk_threshold {
            let mut kept = Vec::with_capacity(diaries.len());
            for chunk in diaries.chunks(settings.local_chunk_size.max(1)) {
                kept.extend(chunk.iter().filter(|d| d.id != diary_id).cloned());
                async_std::task::yield_now().await;
            }
            kept
        } else {
            diaries.into_iter().filter(|d| d.id != diary_id).collect()
        };
        self.inner.cache.save_diaries(&remaining);

        let videos: Vec<DiaryVideo> = self
            .inner
            .cache
            .videos()
            .into_iter()
            .filter(|v| v.diary_id != diary_id)
            .collect();
        self.inner.cache.save_videos(&videos);
    }

    /// Put the diary back after its deletion failed. Undo snapshots of other
    /// diaries are left alone.
    fn roll_back_deletion(&self, diary: &Diary, error: &Error, open_gate: bool) {
        let mut restored = diary.clone();
        restored.start_time = None;
        {
            let mut state = self.lock();
            let mut actions = vec![
                DiariesAction::RestoreDiary(restored),
                DiariesAction::SetError(Some(delete_failed_message(error))),
            ];
            if state.view.last_deleted_diary.as_ref().is_some_and(|d| d.id == diary.id) {
                actions.push(DiariesAction::SetLastDeletedDiary(None));
            }
            if open_gate {
                actions.push(DiariesAction::SetIsDeleting(false));
                state.gate_job = None;
            }
            reduce(&mut state.view, DiariesAction::Batch(actions));
            Self::publish(&mut state);
        }
        if self.inner.cache.last_deleted().is_some_and(|d| d.id == diary.id) {
            self.inner.cache.clear_last_deleted();
        }
    }

    fn release_gate(&self, job_id: &str) -> bool {
        let mut state = self.lock();
        if state.gate_job.as_deref() != Some(job_id) {
            return false;
        }
        state.gate_job = None;
        reduce(&mut state.view, DiariesAction::SetIsDeleting(false));
        Self::publish(&mut state);
        true
    }

    fn spawn_job_monitor(&self, updates: flume::Receiver<DeletionJob>, diary: Diary) {
        let controller = self.clone();
        async_std::task::spawn(async move {
            while let Ok(job) = updates.recv_async().await {
                if controller.apply_job_snapshot(job, &diary).await {
                    break;
                }
            }
        });
    }

    /// Mirror a job snapshot. Returns true once the job has settled.
    async fn apply_job_snapshot(&self, job: DeletionJob, diary: &Diary) -> bool {
        let job_id = job.id.clone();
        let purge_started = job.videos_purge_started;
        let state = job.state;
        let settled = job.is_terminal();
        let error = job.error.clone();

        {
            let mut controller_state = self.lock();
            let mut actions = vec![DiariesAction::UpsertDeletionJob(job)];
            let offers_this_diary = controller_state
                .view
                .last_deleted_diary
                .as_ref()
                .is_some_and(|d| d.id == diary.id);
            if purge_started && offers_this_diary {
                actions.push(DiariesAction::SetLastDeletedDiary(None));
            }
            reduce(&mut controller_state.view, DiariesAction::Batch(actions));
            Self::publish(&mut controller_state);
            if purge_started && offers_this_diary {
                drop(controller_state);
                tracing::info!(diary_id = %diary.id, "Undo no longer possible, videos are being deleted");
                self.inner.cache.clear_last_deleted();
            }
        }

        if !settled {
            return false;
        }

        match state {
            DeletionState::Completed => {
                self.release_gate(&job_id);
                tracing::info!(job_id = %job_id, elapsed_ms = elapsed_ms(diary), "Diary deletion finished");
            }
            DeletionState::Failed => {
                // The gate stays closed until the reload has decided the list
                let error = Error::DbError(error.unwrap_or_default());
                self.roll_back_deletion(diary, &error, false);
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "Reload after failed deletion failed");
                }
                self.dispatch(DiariesAction::SetError(Some(delete_failed_message(&error))));
                self.release_gate(&job_id);
            }
            _ => {
                self.release_gate(&job_id);
            }
        }
        true
    }

    fn spawn_watchdog(&self, job_id: String) {
        let controller = self.clone();
        async_std::task::spawn(async move {
            let timeout = controller.inner.settings.stuck_deletion_timeout;
            controller.inner.scheduler.sleep(timeout).await;
            if controller.release_gate(&job_id) {
                tracing::warn!(
                    job_id = %job_id,
                    timeout_secs = timeout.as_secs(),
                    "Deletion still running, reloading diaries"
                );
                if let Err(e) = controller.refresh().await {
                    tracing::warn!(error = %e, "Reload after stuck deletion failed");
                }
            }
        });
    }

    /// Restore the last deleted diary.
    ///
    /// Only one call can take the undo candidate; a second call fails with
    /// `NothingToUndo`.
    #[tracing::instrument(skip(self), err)]
    pub async fn undo_last_deletion(&self) -> Result<Diary, Error> {
        let mut diary = {
            let mut state = self.lock();
            let diary = state
                .view
                .last_deleted_diary
                .take()
                .ok_or(Error::NothingToUndo)?;
            Self::publish(&mut state);
            diary
        };
        diary.start_time = None;

        if self.is_remote_available() {
            match self.inner.deletion.recover_diary(&diary.id).await {
                Ok(()) => {
                    self.dispatch(DiariesAction::RestoreDiary(diary.clone()));
                    self.inner.cache.clear_last_deleted();
                    tracing::info!(diary_id = %diary.id, "Diary restored");
                    return Ok(diary);
                }
                Err(e) if e.is_remote_failure() => self.degrade(WRITE_FAILED_MESSAGE, &e),
                Err(e) => {
                    self.dispatch(DiariesAction::SetError(Some(format!(
                        "Could not restore diary: {}",
                        e
                    ))));
                    self.inner.cache.clear_last_deleted();
                    return Err(e);
                }
            }
        }

        self.dispatch(DiariesAction::RestoreDiary(diary.clone()));
        self.inner.cache.append_diary(&diary);
        self.inner.cache.clear_last_deleted();
        tracing::info!(diary_id = %diary.id, "Diary restored locally");
        Ok(diary)
    }
}

fn delete_failed_message(error: &Error) -> String {
    format!("Failed to delete diary: {}", error)
}

fn elapsed_ms(diary: &Diary) -> u64 {
    diary
        .start_time
        .map(|start| start.elapsed().as_millis() as u64)
        .unwrap_or_default()
}
