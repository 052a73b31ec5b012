pub mod error;
pub mod pod;
pub mod runtime;
pub mod simulated;

use std::sync::Arc;

use greenbatch_core::config::{RuntimeConfig, StorageConfig};
use greenbatch_core::{Store, TimeSource};

pub use error::RuntimeError;
pub use pod::{ResourceStat, RuntimePod, APP_LABEL, POD_IDENTIFIER_LABEL};
pub use runtime::{ContainerRuntime, StatStream};
pub use simulated::{SimulatedRuntime, SimulationSettings};

/// Build the configured container runtime.
pub fn runtime_from_config(
    runtime: &RuntimeConfig,
    storage: &StorageConfig,
    store: Arc<Store>,
    clock: Arc<dyn TimeSource>,
) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    match runtime.provider.as_str() {
        "simulated" => {
            let settings = SimulationSettings::from_config(runtime, storage);
            Ok(Arc::new(SimulatedRuntime::new(store, clock, settings)))
        }
        other => Err(RuntimeError::UnknownProvider(other.to_string())),
    }
}
