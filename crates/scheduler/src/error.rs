use thiserror::Error;
use uuid::Uuid;

use greenbatch_core::{PipelineRole, QueueError, StoreError};
use greenbatch_forecast::ForecastError;
use greenbatch_runtime::RuntimeError;
use greenbatch_storage::StorageError;

use crate::energy::EnergyError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("energy accounting error: {0}")]
    Energy(#[from] EnergyError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("{role} stage of file {file_id} timed out (pod {pod})")]
    StageTimeout {
        role: PipelineRole,
        file_id: Uuid,
        pod: Uuid,
    },

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("failed to spawn thread: {0}")]
    Spawn(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
