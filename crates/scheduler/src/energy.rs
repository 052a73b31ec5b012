use chrono::{DateTime, Utc};
use thiserror::Error;

use greenbatch_core::config::EnergyConfig;
use greenbatch_core::duration_as_secs_f64;
use greenbatch_runtime::ResourceStat;

const JOULES_PER_KWH: f64 = 3.6e6;
const BYTES_PER_GB: f64 = 1e9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnergyError {
    #[error("memory limit changed during sampling: expected {expected} bytes, got {actual}")]
    MemoryLimitChanged { expected: u64, actual: u64 },
}

/// Energy used over one sampling interval.
///
/// ```text
/// cpu_watts = min + cpu_fraction * (max - min)
/// kWh       = secs * (cpu_watts * vcpus + mem_gb * watts_per_gb) / 3.6e6
/// ```
pub fn sample_kwh(stat: &ResourceStat, energy: &EnergyConfig) -> f64 {
    let secs = stat
        .prior_sample_time
        .map(|prior| duration_as_secs_f64(stat.sample_time - prior).max(0.0))
        .unwrap_or(0.0);

    let cpu_watts =
        energy.platform_min_watts + stat.cpu_fraction() * (energy.platform_max_watts - energy.platform_min_watts);
    let cpu_kwh = secs * cpu_watts * energy.vcpu_count as f64 / JOULES_PER_KWH;
    let memory_kwh = secs * (stat.memory_usage as f64 / BYTES_PER_GB) * energy.memory_watts_per_gb / JOULES_PER_KWH;
    cpu_kwh + memory_kwh
}

/// Convert a pod's stat stream into `(timestamp, kWh)` pairs. The first
/// sample has no prior reading and contributes zero.
pub fn samples_to_kwh(
    samples: &[ResourceStat],
    system_memory_bytes: u64,
    energy: &EnergyConfig,
) -> Result<Vec<(DateTime<Utc>, f64)>, EnergyError> {
    samples
        .iter()
        .map(|stat| {
            if stat.memory_limit != system_memory_bytes {
                return Err(EnergyError::MemoryLimitChanged {
                    expected: system_memory_bytes,
                    actual: stat.memory_limit,
                });
            }
            Ok((stat.sample_time, sample_kwh(stat, energy)))
        })
        .collect()
}
