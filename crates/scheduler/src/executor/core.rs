use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use greenbatch_core::config::EnergyConfig;
use greenbatch_core::{Config, Store, TimeSource};
use greenbatch_runtime::ContainerRuntime;

use crate::error::SchedulerError;
use crate::metrics::ExecutorMetrics;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Worker threads per queue.
    pub max_concurrent_processors: u32,
    pub poll_interval: Duration,
    /// Extra polls tolerated past a stage timeout when timeouts are ignored.
    pub timeout_grace_polls: u32,
    /// Memory ceiling every stat sample must report.
    pub system_memory_bytes: u64,
    pub energy: EnergyConfig,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_processors: config.scheduling.max_concurrent_processors.max(1),
            poll_interval: config.scheduling.pod_poll_interval(),
            timeout_grace_polls: config.scheduling.timeout_grace_polls,
            system_memory_bytes: config.runtime.simulated_memory_limit,
            energy: config.energy.clone(),
        }
    }
}

/// Outcome of one `execute_ready_queues` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub queues: usize,
    /// Entry ids in claim order.
    pub popped: Vec<Uuid>,
    pub completed: usize,
    pub timeouts: usize,
}

/// Executes task queues against the container runtime.
pub struct QueueExecutor {
    pub(super) store: Arc<Store>,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
    pub(super) clock: Arc<dyn TimeSource>,
    pub(super) settings: ExecutorSettings,
    /// Kept apart from the queue locks.
    pub(super) metrics: Arc<RwLock<ExecutorMetrics>>,
}

impl QueueExecutor {
    pub fn new(
        store: Arc<Store>,
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn TimeSource>,
        settings: ExecutorSettings,
    ) -> Self {
        info!(
            workers = settings.max_concurrent_processors,
            poll_ms = settings.poll_interval.as_millis() as u64,
            "queue executor ready"
        );
        Self {
            store,
            runtime,
            clock,
            settings,
            metrics: Arc::new(RwLock::new(ExecutorMetrics::default())),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Snapshot of the current executor metrics.
    pub fn metrics(&self) -> Result<ExecutorMetrics, SchedulerError> {
        self.metrics
            .read()
            .map(|m| m.clone())
            .map_err(|e| SchedulerError::LockPoisoned(format!("executor metrics read lock: {}", e)))
    }

    pub fn metrics_handle(&self) -> Arc<RwLock<ExecutorMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub(super) fn with_metrics(&self, f: impl FnOnce(&mut ExecutorMetrics)) {
        match self.metrics.write() {
            Ok(mut m) => f(&mut m),
            Err(e) => warn!("executor metrics write lock poisoned: {}", e),
        }
    }
}
