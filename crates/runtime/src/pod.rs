use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greenbatch_core::PipelineRole;

/// Label carrying the correlation id a pod was launched with.
pub const POD_IDENTIFIER_LABEL: &str = "pod-identifier";
/// Label carrying the deployment name of the pod's role.
pub const APP_LABEL: &str = "app";

/// A pod as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePod {
    pub identifier: Uuid,
    pub role: PipelineRole,
    pub name: String,
    pub namespace: String,
    pub ip: Option<String>,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// One resource usage reading of a container, with the counters of the
/// reading before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStat {
    /// Cumulative CPU time used by the container (ns).
    pub cpu_usage_total: u64,
    /// Cumulative CPU time of the host (ns).
    pub cpu_usage_system: u64,
    pub prior_cpu_usage_total: u64,
    pub prior_cpu_usage_system: u64,
    /// Bytes in use.
    pub memory_usage: u64,
    /// Memory ceiling of the container in bytes.
    pub memory_limit: u64,
    pub sample_time: DateTime<Utc>,
    pub prior_sample_time: Option<DateTime<Utc>>,
}

impl ResourceStat {
    /// Share of host CPU used since the prior reading, in `[0, 1]`.
    pub fn cpu_fraction(&self) -> f64 {
        let cpu_delta = self.cpu_usage_total.saturating_sub(self.prior_cpu_usage_total) as f64;
        let system_delta = self.cpu_usage_system.saturating_sub(self.prior_cpu_usage_system) as f64;
        if system_delta > 0.0 && cpu_delta > 0.0 {
            (cpu_delta / system_delta).min(1.0)
        } else {
            0.0
        }
    }

    /// Share of the memory ceiling in use.
    pub fn memory_fraction(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_usage as f64 / self.memory_limit as f64
        }
    }
}
