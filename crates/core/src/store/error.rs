use thiserror::Error;
use uuid::Uuid;

/// Errors produced by [`Store`](super::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("file not found: {0}")]
    FileNotFound(Uuid),

    #[error("a file with path {0} is already tracked")]
    DuplicatePath(String),

    #[error("metric not found for file {0}")]
    MetricNotFound(Uuid),

    #[error("pod not found: {0}")]
    PodNotFound(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
