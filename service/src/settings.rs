use std::time::Duration;

use database::MAX_BATCH_OPERATIONS;

/// Tunables of the deletion pipeline and the diary controller.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Retries after the first failed run of a deletion job
    pub max_retries: u32,
    /// Videos deleted per atomic batch. Clamped to the store limit
    pub video_batch_size: usize,
    /// Blobs deleted concurrently per chunk
    pub storage_batch_size: usize,
    /// How long completed and recovered jobs stay queryable
    pub completed_job_grace: Duration,
    /// How long terminally failed jobs stay queryable
    pub failed_job_grace: Duration,
    /// After this the controller stops waiting for a deletion and reloads
    pub stuck_deletion_timeout: Duration,
    /// Local deletions process the diary list in chunks of this size...
    pub local_chunk_size: usize,
    /// ...once it holds more than this many diaries
    pub local_chunk_threshold: usize,
    pub max_title_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            video_batch_size: 100,
            storage_batch_size: 20,
            completed_job_grace: Duration::from_secs(60),
            failed_job_grace: Duration::from_secs(60 * 60),
            stuck_deletion_timeout: Duration::from_secs(10),
            local_chunk_size: 50,
            local_chunk_threshold: 100,
            max_title_length: 30,
        }
    }
}

impl Settings {
    pub fn effective_video_batch_size(&self) -> usize {
        self.video_batch_size.clamp(1, MAX_BATCH_OPERATIONS)
    }

    pub fn effective_storage_batch_size(&self) -> usize {
        self.storage_batch_size.max(1)
    }
}
