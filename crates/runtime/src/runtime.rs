use uuid::Uuid;

use greenbatch_core::PipelineRole;

use crate::error::RuntimeError;
use crate::pod::{ResourceStat, RuntimePod};

/// Blocking sequence of resource readings. Ends when the container exits.
pub type StatStream = Box<dyn Iterator<Item = Result<ResourceStat, RuntimeError>> + Send>;

/// Orchestration backend that runs pipeline containers.
pub trait ContainerRuntime: Send + Sync {
    /// Launch one pod for `role`, labelled with `correlation_id` so the pod
    /// can find the files assigned to it.
    fn run_pod_for_role(&self, role: PipelineRole, correlation_id: Uuid) -> Result<RuntimePod, RuntimeError>;

    /// Live pods, optionally restricted to one role.
    fn get_pods(&self, role: Option<PipelineRole>) -> Result<Vec<RuntimePod>, RuntimeError>;

    /// Adjust the number of standby pods of `role` to `replicas`.
    fn scale_role(&self, role: PipelineRole, replicas: usize) -> Result<Vec<RuntimePod>, RuntimeError>;

    /// Remove a pod. `force` skips the grace period.
    fn delete_pod(&self, identifier: Uuid, force: bool) -> Result<(), RuntimeError>;

    fn stream_resource_stats(&self, identifier: Uuid) -> Result<StatStream, RuntimeError>;
}
