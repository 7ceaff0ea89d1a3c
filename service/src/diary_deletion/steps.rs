use std::sync::Arc;

use cloud_storage::CloudStorageOps;
use core_types::DeletionState;
use database::{BatchOp, WriteBatch};

use crate::{
    diary_deletion::context::DeletionContext,
    error::Error,
    pipeline::{PipelineStep, StepAction},
};

fn transition(context: &DeletionContext, next: DeletionState) -> Result<(), Error> {
    context.registry.transition(&context.job_id, next).map(|_| ())
}

/// Step 1: Mark the diary deleted. Readers stop seeing it from here on.
pub struct SoftDeleteDiaryStep;

#[async_trait::async_trait]
impl PipelineStep<DeletionContext> for SoftDeleteDiaryStep {
    fn name(&self) -> &'static str {
        "soft_delete_diary"
    }

    async fn execute(&self, context: &mut DeletionContext) -> StepAction {
        if let Err(e) = context.ensure_running() {
            return StepAction::Abort(e);
        }

        match context.store.set_diary_deleted(&context.diary_id, true).await {
            Ok(()) => context.soft_delete_applied = true,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    diary_id = %context.diary_id,
                    "Diary document missing, continuing with dependent records"
                );
            }
            Err(e) => {
                tracing::error!(diary_id = %context.diary_id, error = %e, "Soft delete failed");
                return StepAction::Abort(e.into());
            }
        }

        match transition(context, DeletionState::SoftDeleted) {
            Ok(()) => StepAction::Continue,
            Err(e) => StepAction::Abort(e),
        }
    }
}

/// Step 2: Delete all video records of the diary in bounded atomic batches
pub struct DeleteVideosStep;

#[async_trait::async_trait]
impl PipelineStep<DeletionContext> for DeleteVideosStep {
    fn name(&self) -> &'static str {
        "delete_videos"
    }

    async fn execute(&self, context: &mut DeletionContext) -> StepAction {
        if let Err(e) = transition(context, DeletionState::DeletingVideos) {
            return StepAction::Abort(e);
        }

        let video_ids = match context.store.get_video_ids_by_diary(&context.diary_id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(diary_id = %context.diary_id, error = %e, "Failed to query videos");
                return StepAction::Abort(e.into());
            }
        };

        let batch_size = context.settings.effective_video_batch_size();
        tracing::info!(
            diary_id = %context.diary_id,
            videos = video_ids.len(),
            batch_size,
            "Deleting videos"
        );

        for chunk in video_ids.chunks(batch_size) {
            let batch: WriteBatch = chunk.iter().cloned().map(BatchOp::DeleteVideo).collect();
            if let Err(e) = context.store.commit_batch(&batch).await {
                tracing::error!(
                    diary_id = %context.diary_id,
                    deleted = context.videos_deleted,
                    error = %e,
                    "Video batch failed"
                );
                return StepAction::Abort(e.into());
            }
            context.videos_deleted += chunk.len();
            async_std::task::yield_now().await;
        }

        StepAction::Continue
    }
}

/// Step 3: Delete the diary's blobs. Best effort, never fails the pipeline.
pub struct DeleteStorageStep;

#[async_trait::async_trait]
impl PipelineStep<DeletionContext> for DeleteStorageStep {
    fn name(&self) -> &'static str {
        "delete_storage"
    }

    async fn execute(&self, context: &mut DeletionContext) -> StepAction {
        if let Err(e) = transition(context, DeletionState::DeletingStorage) {
            return StepAction::Abort(e);
        }

        let prefix = format!("{}/", context.storage_prefix());
        let keys = match context.cloud_storage.list_files(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Could not list blobs, leaving them behind");
                return StepAction::Continue;
            }
        };

        for chunk in keys.chunks(context.settings.effective_storage_batch_size()) {
            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|key| {
                    let storage: Arc<dyn CloudStorageOps> = Arc::clone(&context.cloud_storage);
                    async_std::task::spawn(async move {
                        let result = storage.delete_file(&key).await;
                        (key, result)
                    })
                })
                .collect();

            for handle in handles {
                match handle.await {
                    (_, Ok(())) => context.blobs_deleted += 1,
                    (key, Err(e)) if e.is_not_found() => {
                        tracing::debug!(key = %key, "Blob already gone");
                    }
                    (key, Err(e)) => {
                        context.blob_failures += 1;
                        tracing::warn!(key = %key, error = %e, "Failed to delete blob");
                    }
                }
            }
            async_std::task::yield_now().await;
        }

        tracing::info!(
            diary_id = %context.diary_id,
            deleted = context.blobs_deleted,
            failed = context.blob_failures,
            "Storage cleanup finished"
        );
        StepAction::Continue
    }
}

/// Step 4: Delete the diary document itself
pub struct DeleteDiaryDocumentStep;

#[async_trait::async_trait]
impl PipelineStep<DeletionContext> for DeleteDiaryDocumentStep {
    fn name(&self) -> &'static str {
        "delete_diary_document"
    }

    async fn execute(&self, context: &mut DeletionContext) -> StepAction {
        if let Err(e) = transition(context, DeletionState::DeletingDiary) {
            return StepAction::Abort(e);
        }

        match context.store.delete_diary(&context.diary_id).await {
            Ok(()) => StepAction::Continue,
            Err(e) if e.is_not_found() => {
                tracing::debug!(diary_id = %context.diary_id, "Diary document already deleted");
                StepAction::Continue
            }
            Err(e) => StepAction::Abort(e.into()),
        }
    }
}
