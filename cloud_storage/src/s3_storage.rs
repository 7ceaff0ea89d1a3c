use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use crate::{CloudStorageError, ops::CloudStorageOps};

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
}

/// Blob store on an S3 compatible bucket
pub struct S3CloudStorage {
    bucket: Box<Bucket>,
}

impl S3CloudStorage {
    pub fn connect(config: &S3Config) -> Result<Self, CloudStorageError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = Credentials::default()
            .map_err(|e| CloudStorageError::Other(format!("Credentials error: {e}")))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)?.with_path_style();
        tracing::info!(bucket = %config.bucket, "Connected to bucket");

        Ok(Self { bucket })
    }
}

#[async_trait]
impl CloudStorageOps for S3CloudStorage {
    async fn upload_file(&self, cloud_key: &str, content: &[u8]) -> Result<(), CloudStorageError> {
        self.bucket.put_object(cloud_key, content).await?;
        tracing::debug!(key = cloud_key, bytes = content.len(), "Uploaded blob");
        Ok(())
    }

    async fn get_url(&self, cloud_key: &str) -> Result<String, CloudStorageError> {
        Ok(format!("{}/{}", self.bucket.url(), cloud_key))
    }

    async fn delete_file(&self, cloud_key: &str) -> Result<(), CloudStorageError> {
        self.bucket.delete_object(cloud_key).await?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents.into_iter().map(|object| object.key))
            .collect())
    }
}
