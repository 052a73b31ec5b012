use std::future::Future;
use std::path::Path as FsPath;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use greenbatch_core::config::AwsConfig;

use crate::error::StorageError;
use crate::{ObjectStorage, StoredObject};

/// Blocking [`ObjectStorage`] over an `object_store` backend. Each bucket is a
/// top-level prefix of the underlying store.
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    /// Set for the local filesystem, where buckets are directories.
    local_root: Option<std::path::PathBuf>,
    runtime: Runtime,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Result<Self, StorageError> {
        Ok(Self {
            store,
            local_root: None,
            runtime: storage_runtime()?,
        })
    }

    /// Filesystem backend rooted at `root`, created if missing.
    pub fn local(root: &FsPath) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            local_root: Some(canonical),
            runtime: storage_runtime()?,
        })
    }

    pub fn s3(aws: &AwsConfig) -> Result<Self, StorageError> {
        let bucket = aws
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET not set".into()))?;

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        match aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                // object_store requires absolute URLs
                let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.to_string()
                } else {
                    format!("https://{}", endpoint)
                };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_allow_http(endpoint_url.starts_with("http://"))
                    .with_endpoint(endpoint_url);
            }
            None => {
                builder = builder.with_url(format!("s3://{}", bucket));
            }
        }

        let store = builder.build()?;
        info!("Storage: S3 backend s3://{} (region: {})", bucket, aws.region);
        Self::new(Arc::new(store))
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn list_paths(&self, bucket: &str) -> Result<Vec<object_store::ObjectMeta>, StorageError> {
        let prefix = Path::from(bucket);
        self.block_on(async { self.store.list(Some(&prefix)).try_collect::<Vec<_>>().await })
            .map_err(StorageError::from)
    }
}

fn storage_runtime() -> Result<Runtime, StorageError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("greenbatch-storage")
        .enable_all()
        .build()?)
}

fn object_path(bucket: &str, key: &str) -> Path {
    Path::from(format!("{}/{}", bucket, key.trim_start_matches('/')))
}

fn map_not_found(e: object_store::Error, bucket: &str, key: &str) -> StorageError {
    match e {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        other => StorageError::ObjectStore(other),
    }
}

impl ObjectStorage for ObjectStoreStorage {
    fn list_all_files(&self, bucket: &str) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = format!("{}/", bucket);
        let mut objects: Vec<StoredObject> = self
            .list_paths(bucket)?
            .into_iter()
            .filter_map(|meta| {
                let location = meta.location.to_string();
                let key = location.strip_prefix(&prefix)?.to_string();
                Some(StoredObject {
                    bucket: bucket.to_string(),
                    key,
                    size: meta.size as u64,
                })
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(bucket, count = objects.len(), "listed bucket");
        Ok(objects)
    }

    fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = object_path(bucket, key);
        self.block_on(self.store.put(&path, PutPayload::from(data)))?;
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let path = object_path(bucket, key);
        self.block_on(async { self.store.get(&path).await?.bytes().await })
            .map_err(|e| map_not_found(e, bucket, key))
    }

    fn copy(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError> {
        let (from, to) = (object_path(from_bucket, key), object_path(to_bucket, key));
        self.block_on(self.store.copy(&from, &to))
            .map_err(|e| map_not_found(e, from_bucket, key))
    }

    fn move_between_buckets(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError> {
        let (from, to) = (object_path(from_bucket, key), object_path(to_bucket, key));
        self.block_on(self.store.rename(&from, &to))
            .map_err(|e| map_not_found(e, from_bucket, key))?;
        info!(from = from_bucket, to = to_bucket, key, "moved object");
        Ok(())
    }

    fn delete_file(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = object_path(bucket, key);
        self.block_on(self.store.delete(&path))
            .map_err(|e| map_not_found(e, bucket, key))
    }

    fn delete_all_in_bucket(&self, bucket: &str) -> Result<usize, StorageError> {
        let paths = self.list_paths(bucket)?;
        let count = paths.len();
        self.block_on(async {
            for meta in &paths {
                self.store.delete(&meta.location).await?;
            }
            Ok::<_, object_store::Error>(())
        })?;
        info!(bucket, count, "emptied bucket");
        Ok(count)
    }

    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let listing = self.block_on(self.store.list_with_delimiter(None))?;
        let mut buckets: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.parts().next().map(|part| part.as_ref().to_string()))
            .collect();
        buckets.sort();
        buckets.dedup();
        Ok(buckets)
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        // Prefix-based stores have no bucket objects to create.
        if let Some(root) = &self.local_root {
            std::fs::create_dir_all(root.join(bucket))?;
        }
        Ok(())
    }
}
