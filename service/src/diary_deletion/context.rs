use std::sync::Arc;

use cloud_storage::CloudStorageOps;
use database::DocumentStoreOps;

use crate::{diary_deletion::job_registry::JobRegistry, error::Error, settings::Settings};

/// Context object that flows through the deletion pipeline, accumulating state
pub struct DeletionContext {
    pub job_id: String,
    pub diary_id: String,
    pub owner_id: String,
    pub store: Arc<dyn DocumentStoreOps>,
    pub cloud_storage: Arc<dyn CloudStorageOps>,
    pub registry: Arc<JobRegistry>,
    pub settings: Arc<Settings>,

    // Accumulated state as pipeline progresses
    /// This run wrote the soft-delete flag
    pub soft_delete_applied: bool,
    pub videos_deleted: usize,
    pub blobs_deleted: usize,
    pub blob_failures: usize,
}

impl DeletionContext {
    pub fn new(
        job_id: String,
        diary_id: String,
        owner_id: String,
        store: Arc<dyn DocumentStoreOps>,
        cloud_storage: Arc<dyn CloudStorageOps>,
        registry: Arc<JobRegistry>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            job_id,
            diary_id,
            owner_id,
            store,
            cloud_storage,
            registry,
            settings,
            soft_delete_applied: false,
            videos_deleted: 0,
            blobs_deleted: 0,
            blob_failures: 0,
        }
    }

    pub fn storage_prefix(&self) -> String {
        core_types::diary_storage_prefix(&self.owner_id, &self.diary_id)
    }

    /// Fails once the job has been recovered or pruned.
    pub fn ensure_running(&self) -> Result<(), Error> {
        self.registry.ensure_running(&self.job_id)
    }
}
