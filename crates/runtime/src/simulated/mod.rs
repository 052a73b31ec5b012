//! In-process container runtime.
//!
//! Each launched pod is a named thread that works through the files assigned
//! to it, applying the state transitions of its pipeline role:
//! - `transfer`: Pending file gets a Downloaded child in the processing bucket
//! - `unpack`: Downloaded file gets an Unzipped child
//! - `decode`: Unzipped file becomes Unpickled
//!
//! Resource statistics are synthesised from elapsed time on a clock of their
//! own, so stat streams never move the clock the pods and their callers share.

mod stats;
mod worker;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use greenbatch_core::config::{RuntimeConfig, StorageConfig};
use greenbatch_core::{PipelineRole, Store, SystemTimeSource, TimeSource};

use crate::error::RuntimeError;
use crate::pod::{RuntimePod, APP_LABEL, POD_IDENTIFIER_LABEL};
use crate::runtime::{ContainerRuntime, StatStream};

use stats::SimulatedStats;
use worker::Worker;

pub const SIMULATED_NAMESPACE: &str = "greenbatch";

pub const STATUS_RUNNING: &str = "Running";
pub const STATUS_SUCCEEDED: &str = "Succeeded";
pub const STATUS_FAILED: &str = "Failed";
pub const STATUS_TERMINATING: &str = "Terminating";

/// Tunables of the simulated runtime.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Bytes per second a pod processes. `0` finishes files instantly.
    pub processing_speed: f64,
    pub sample_interval: Duration,
    pub memory_limit: u64,
    pub memory_usage: u64,
    /// Share of host CPU a busy pod reports.
    pub cpu_share: f64,
    /// Bucket that transfer pods download into.
    pub processing_bucket: String,
    /// Pods never finish their files. Used to exercise stage timeouts.
    pub hang: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let memory_limit = 2 * 1024 * 1024 * 1024;
        Self {
            processing_speed: 0.0,
            sample_interval: Duration::from_millis(1000),
            memory_limit,
            memory_usage: memory_limit / 4,
            cpu_share: 0.5,
            processing_bucket: "processing".to_string(),
            hang: false,
        }
    }
}

impl SimulationSettings {
    pub fn from_config(runtime: &RuntimeConfig, storage: &StorageConfig) -> Self {
        Self {
            processing_speed: runtime.simulated_processing_speed.max(0.0),
            sample_interval: Duration::from_millis(runtime.simulated_sample_interval_ms.max(1)),
            memory_limit: runtime.simulated_memory_limit,
            memory_usage: runtime.simulated_memory_limit / 4,
            processing_bucket: storage.processing_bucket.clone(),
            ..Self::default()
        }
    }
}

/// Liveness flags shared between a pod's thread, its stat streams and the
/// runtime.
#[derive(Debug, Default)]
pub(crate) struct PodState {
    deleted: AtomicBool,
    exited: AtomicBool,
    status: Mutex<String>,
}

impl PodState {
    fn running() -> Self {
        Self {
            status: Mutex::new(STATUS_RUNNING.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub(crate) fn has_ended(&self) -> bool {
        self.is_deleted() || self.exited.load(Ordering::SeqCst)
    }

    fn status(&self) -> String {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_status(&self, status: &str) {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *guard = status.to_string();
    }

    pub(crate) fn exit(&self, status: &str) {
        self.set_status(status);
        self.exited.store(true, Ordering::SeqCst);
    }

    fn delete(&self) {
        self.set_status(STATUS_TERMINATING);
        self.deleted.store(true, Ordering::SeqCst);
    }
}

struct SimPod {
    pod: RuntimePod,
    state: Arc<PodState>,
    /// Scaled-up replica without assigned work.
    standby: bool,
}

impl SimPod {
    fn snapshot(&self) -> RuntimePod {
        RuntimePod {
            status: self.state.status(),
            ..self.pod.clone()
        }
    }
}

/// Runs pipeline pods as threads against the shared [`Store`].
pub struct SimulatedRuntime {
    store: Arc<Store>,
    clock: Arc<dyn TimeSource>,
    /// Paces and timestamps stat samples.
    stats_clock: Arc<dyn TimeSource>,
    settings: SimulationSettings,
    pods: Mutex<HashMap<Uuid, SimPod>>,
}

impl SimulatedRuntime {
    pub fn new(store: Arc<Store>, clock: Arc<dyn TimeSource>, settings: SimulationSettings) -> Self {
        info!(
            speed = settings.processing_speed,
            hang = settings.hang,
            "simulated container runtime"
        );
        Self {
            store,
            clock,
            stats_clock: Arc::new(SystemTimeSource),
            settings,
            pods: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall clock behind stat streams.
    pub fn with_stats_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.stats_clock = clock;
        self
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    fn lock_pods(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SimPod>>, RuntimeError> {
        self.pods
            .lock()
            .map_err(|e| RuntimeError::LockPoisoned(format!("simulated pods lock: {}", e)))
    }

    fn describe(&self, role: PipelineRole, identifier: Uuid) -> RuntimePod {
        let short = identifier.simple().to_string();
        let mut labels = BTreeMap::new();
        labels.insert(POD_IDENTIFIER_LABEL.to_string(), identifier.to_string());
        labels.insert(APP_LABEL.to_string(), role.as_str().to_string());
        RuntimePod {
            identifier,
            role,
            name: format!("{}-{}", role.as_str(), &short[..8]),
            namespace: SIMULATED_NAMESPACE.to_string(),
            ip: Some("127.0.0.1".to_string()),
            status: STATUS_RUNNING.to_string(),
            labels,
            created_at: self.clock.now(),
        }
    }
}

impl ContainerRuntime for SimulatedRuntime {
    fn run_pod_for_role(&self, role: PipelineRole, correlation_id: Uuid) -> Result<RuntimePod, RuntimeError> {
        let pod = self.describe(role, correlation_id);
        let state = Arc::new(PodState::running());

        let worker = Worker {
            role,
            identifier: correlation_id,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
            state: Arc::clone(&state),
        };

        // Registered before the thread starts so an immediate delete finds it.
        self.lock_pods()?.insert(
            correlation_id,
            SimPod {
                pod: pod.clone(),
                state: Arc::clone(&state),
                standby: false,
            },
        );

        let spawned = thread::Builder::new()
            .name(pod.name.clone())
            .spawn(move || worker.run_to_completion());
        if let Err(e) = spawned {
            self.lock_pods()?.remove(&correlation_id);
            return Err(RuntimeError::LaunchFailed(format!("{}: {}", pod.name, e)));
        }

        debug!(pod = %pod.name, role = %role, "launched simulated pod");
        Ok(pod)
    }

    fn get_pods(&self, role: Option<PipelineRole>) -> Result<Vec<RuntimePod>, RuntimeError> {
        let pods = self.lock_pods()?;
        let mut live: Vec<RuntimePod> = pods
            .values()
            .filter(|p| !p.state.has_ended())
            .filter(|p| role.map_or(true, |r| p.pod.role == r))
            .map(SimPod::snapshot)
            .collect();
        live.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(live)
    }

    fn scale_role(&self, role: PipelineRole, replicas: usize) -> Result<Vec<RuntimePod>, RuntimeError> {
        {
            let mut pods = self.lock_pods()?;
            let standby: Vec<Uuid> = pods
                .values()
                .filter(|p| p.standby && p.pod.role == role && !p.state.has_ended())
                .map(|p| p.pod.identifier)
                .collect();

            if standby.len() > replicas {
                for id in &standby[replicas..] {
                    if let Some(p) = pods.get(id) {
                        p.state.delete();
                    }
                }
            }
            for _ in standby.len()..replicas {
                let pod = self.describe(role, Uuid::new_v4());
                pods.insert(
                    pod.identifier,
                    SimPod {
                        pod,
                        state: Arc::new(PodState::running()),
                        standby: true,
                    },
                );
            }
            info!(role = %role, replicas, previous = standby.len(), "scaled simulated role");
        }
        self.get_pods(Some(role))
    }

    fn delete_pod(&self, identifier: Uuid, force: bool) -> Result<(), RuntimeError> {
        let pods = self.lock_pods()?;
        let pod = pods.get(&identifier).ok_or(RuntimeError::PodNotFound(identifier))?;
        if !pod.state.is_deleted() {
            pod.state.delete();
            if force {
                warn!(pod = %pod.pod.name, "force deleted simulated pod");
            } else {
                debug!(pod = %pod.pod.name, "deleted simulated pod");
            }
        }
        Ok(())
    }

    fn stream_resource_stats(&self, identifier: Uuid) -> Result<StatStream, RuntimeError> {
        let state = {
            let pods = self.lock_pods()?;
            let pod = pods.get(&identifier).ok_or(RuntimeError::PodNotFound(identifier))?;
            Arc::clone(&pod.state)
        };
        Ok(Box::new(SimulatedStats::new(state, Arc::clone(&self.stats_clock), &self.settings)))
    }
}
