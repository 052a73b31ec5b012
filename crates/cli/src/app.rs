use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::info;

use greenbatch_core::{Config, Store, SystemTimeSource, TimeSource};
use greenbatch_forecast::provider_from_config;
use greenbatch_runtime::{runtime_from_config, ContainerRuntime};
use greenbatch_scheduler::{ExecutorSettings, PodReconciler, QueueExecutor, ScheduleBuilder};
use greenbatch_storage::{storage_from_config, ObjectStorage};

/// Everything a command needs, wired from config.
pub struct App {
    pub config: Config,
    pub store: Arc<Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub builder: ScheduleBuilder,
    pub executor: QueueExecutor,
    pub reconciler: PodReconciler,
    state_path: PathBuf,
    save_lock: Mutex<()>,
}

impl App {
    pub fn build(config: Config) -> Result<Self> {
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        Self::with_clock(config, clock)
    }

    pub fn with_clock(config: Config, clock: Arc<dyn TimeSource>) -> Result<Self> {
        let state_path = config.storage.state_path();
        let store = Arc::new(
            Store::open(&state_path).with_context(|| format!("failed to open state at {}", state_path.display()))?,
        );

        let storage = storage_from_config(&config).context("failed to set up object storage")?;
        let forecast = provider_from_config(&config.forecast, &config.scheduling, Arc::clone(&clock))
            .context("failed to set up forecast provider")?;
        let runtime = runtime_from_config(&config.runtime, &config.storage, Arc::clone(&store), Arc::clone(&clock))
            .context("failed to set up container runtime")?;

        let builder = ScheduleBuilder::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            forecast,
            Arc::clone(&clock),
            config.scheduling.clone(),
            config.storage.pending_bucket.clone(),
        );
        let executor = QueueExecutor::new(
            Arc::clone(&store),
            Arc::clone(&runtime),
            Arc::clone(&clock),
            ExecutorSettings::from_config(&config),
        );
        let reconciler = PodReconciler::new(Arc::clone(&store), Arc::clone(&runtime), clock);

        info!(state = %state_path.display(), "application wired");
        Ok(Self {
            config,
            store,
            storage,
            runtime,
            builder,
            executor,
            reconciler,
            state_path,
            save_lock: Mutex::new(()),
        })
    }

    /// Buckets emptied by a full reset.
    pub fn buckets(&self) -> [&str; 2] {
        [
            self.config.storage.pending_bucket.as_str(),
            self.config.storage.processing_bucket.as_str(),
        ]
    }

    /// Persist the store. Concurrent callers write one at a time.
    pub fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store
            .save_snapshot(&self.state_path)
            .with_context(|| format!("failed to save state to {}", self.state_path.display()))
    }
}
