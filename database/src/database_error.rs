use sqlx::Error as SqlxError;
use thiserror::Error;

/// Errors reported by the persistent store adapter.
///
/// `PermissionDenied` and `Unavailable` are what a remote backend reports
/// when rules reject a call or the network is down. Callers treat both the
/// same way and fall back to local data.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    SqlxError(#[from] SqlxError),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Missing or insufficient permissions: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch of {0} operations exceeds the store limit")]
    BatchTooLarge(usize),

    #[error("Parse error: {0}")]
    SerializationError(String),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }
}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
