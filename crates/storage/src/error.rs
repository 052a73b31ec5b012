use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
