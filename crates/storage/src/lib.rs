//! Object storage behind the scheduler's discovery and reset paths.
//!
//! - `memory`: in-process buckets
//! - `backend`: `object_store` on the local filesystem or S3

pub mod backend;
pub mod error;
pub mod memory;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub use backend::ObjectStoreStorage;
pub use error::StorageError;
pub use memory::InMemoryStorage;

/// One object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

/// Blocking bucket/key object storage.
pub trait ObjectStorage: Send + Sync {
    /// Every object in `bucket`, ordered by key. A missing bucket lists empty.
    fn list_all_files(&self, bucket: &str) -> Result<Vec<StoredObject>, StorageError>;

    fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError>;

    fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    fn copy(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Move `key` from one bucket to another, keeping its key.
    fn move_between_buckets(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError>;

    fn delete_file(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Remove every object in `bucket`. Returns the number removed.
    fn delete_all_in_bucket(&self, bucket: &str) -> Result<usize, StorageError>;

    fn list_buckets(&self) -> Result<Vec<String>, StorageError>;

    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;
}

/// Select the storage backend from config. `local` keeps objects under
/// `DATA_DIR/objects`, `s3` needs AWS credentials and a bucket.
pub fn storage_from_config(config: &greenbatch_core::Config) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    let storage: Arc<dyn ObjectStorage> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStorage::new()),
        "local" => {
            let root = config.storage.data_dir.join("objects");
            Arc::new(ObjectStoreStorage::local(&root)?)
        }
        "s3" => {
            if !config.aws.is_configured() {
                return Err(StorageError::NotConfigured(
                    "AWS_ACCESS_KEY_ID and S3_BUCKET are required for the s3 backend".into(),
                ));
            }
            Arc::new(ObjectStoreStorage::s3(&config.aws)?)
        }
        other => return Err(StorageError::UnknownBackend(other.to_string())),
    };
    info!(backend = %config.storage.backend, "object storage ready");

    for bucket in [&config.storage.pending_bucket, &config.storage.processing_bucket] {
        storage.create_bucket(bucket)?;
    }
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_from_config() {
        let mut config = greenbatch_core::Config::for_profile("test");
        config.storage.backend = "memory".into();
        config.storage.pending_bucket = "pending".into();
        config.storage.processing_bucket = "processing".into();
        let storage = storage_from_config(&config).unwrap();
        let buckets = storage.list_buckets().unwrap();
        assert_eq!(buckets, vec!["pending".to_string(), "processing".to_string()]);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = greenbatch_core::Config::for_profile("test");
        config.storage.backend = "ftp".into();
        assert!(matches!(storage_from_config(&config), Err(StorageError::UnknownBackend(b)) if b == "ftp"));
    }

    #[test]
    fn s3_without_credentials_is_not_configured() {
        let mut config = greenbatch_core::Config::for_profile("test");
        config.storage.backend = "s3".into();
        config.aws.access_key_id = None;
        assert!(matches!(storage_from_config(&config), Err(StorageError::NotConfigured(_))));
    }
}
