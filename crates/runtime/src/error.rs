use thiserror::Error;
use uuid::Uuid;

use greenbatch_core::StoreError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("pod not found: {0}")]
    PodNotFound(Uuid),

    #[error("failed to launch pod: {0}")]
    LaunchFailed(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("unknown container runtime: {0}")]
    UnknownProvider(String),
}
