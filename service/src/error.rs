use std::fmt::{Display, Formatter, Result};

use database::database_error::DatabaseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    DbError(String),
    NotFound(String),
    StorageError(String),
    CacheError(String),
    DeserializationError(String),
    InvalidInput(String),
    InvalidStateTransition(String),
    /// The controller already has a deletion in flight
    DeletionInProgress,
    /// The diary already has an active deletion job
    DeletionJobActive(String),
    JobNotFound(String),
    /// The job was recovered while the pipeline was running
    DeletionRecovered,
    /// Videos of the diary are already being purged
    UndoWindowClosed(String),
    NothingToUndo,
    /// No signed-in user
    Unauthenticated,
}

impl Error {
    /// Failures of the remote store that the controller answers by degrading
    /// to local-only operation.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Error::DbError(_) | Error::StorageError(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Error::DbError(message) => write!(f, "Database error: {}", message),
            Error::NotFound(message) => write!(f, "Not found: {}", message),
            Error::StorageError(message) => write!(f, "Storage error: {}", message),
            Error::CacheError(message) => write!(f, "Local cache error: {}", message),
            Error::DeserializationError(message) => write!(f, "Deserialization error: {}", message),
            Error::InvalidInput(message) => write!(f, "Invalid input: {}", message),
            Error::InvalidStateTransition(message) => {
                write!(f, "Invalid state transition: {}", message)
            }
            Error::DeletionInProgress => write!(f, "A deletion is already in progress"),
            Error::DeletionJobActive(diary_id) => {
                write!(f, "Diary {} already has an active deletion job", diary_id)
            }
            Error::JobNotFound(job_id) => write!(f, "Deletion job {} not found", job_id),
            Error::DeletionRecovered => write!(f, "Deletion was cancelled by recovery"),
            Error::UndoWindowClosed(diary_id) => write!(
                f,
                "Diary {} can no longer be recovered, its videos are being deleted",
                diary_id
            ),
            Error::NothingToUndo => write!(f, "No deleted diary to restore"),
            Error::Unauthenticated => write!(f, "Not signed in"),
        }
    }
}

impl std::error::Error for Error {}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(id) => Error::NotFound(id),
            other => Error::DbError(other.to_string()),
        }
    }
}

impl From<cloud_storage::CloudStorageError> for Error {
    fn from(err: cloud_storage::CloudStorageError) -> Self {
        Error::StorageError(err.to_string())
    }
}

impl From<local_cache::LocalCacheError> for Error {
    fn from(err: local_cache::LocalCacheError) -> Self {
        Error::CacheError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DeserializationError(err.to_string())
    }
}
