// S3 backed storage needs the following environment variables:
// - key id (AWS_ACCESS_KEY_ID)
// - application key (AWS_SECRET_ACCESS_KEY)
// Bucket name, region and endpoint are passed in by the caller, for example
// my-diary-bucket, eu-central-003 and s3.eu-central-003.backblazeb2.com.
//

mod file_system_storage;
pub mod mock;
pub mod ops;
mod s3_storage;

use s3::error::S3Error;

pub use file_system_storage::FileSystemCloudStorage;
pub use ops::CloudStorageOps;
pub use s3_storage::{S3CloudStorage, S3Config};

#[derive(Debug, thiserror::Error)]
pub enum CloudStorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] S3Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl CloudStorageError {
    pub fn is_not_found(&self) -> bool {
        match self {
            CloudStorageError::NotFound(_) => true,
            CloudStorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            CloudStorageError::S3(S3Error::HttpFailWithBody(status, _)) => *status == 404,
            _ => false,
        }
    }
}
