use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use greenbatch_core::TimeSource;

use super::{PodState, SimulationSettings};
use crate::error::RuntimeError;
use crate::pod::ResourceStat;

/// Stat stream of a simulated pod. Emits a zero-duration baseline, then one
/// reading per sample interval until the pod ends.
pub(super) struct SimulatedStats {
    state: Arc<PodState>,
    clock: Arc<dyn TimeSource>,
    interval: Duration,
    cpu_share: f64,
    memory_usage: u64,
    memory_limit: u64,
    cpu_total: u64,
    cpu_system: u64,
    last_sample: Option<DateTime<Utc>>,
    done: bool,
}

impl SimulatedStats {
    pub fn new(state: Arc<PodState>, clock: Arc<dyn TimeSource>, settings: &SimulationSettings) -> Self {
        Self {
            state,
            clock,
            interval: settings.sample_interval,
            cpu_share: settings.cpu_share.clamp(0.0, 1.0),
            memory_usage: settings.memory_usage,
            memory_limit: settings.memory_limit,
            cpu_total: 0,
            cpu_system: 0,
            last_sample: None,
            done: false,
        }
    }
}

impl Iterator for SimulatedStats {
    type Item = Result<ResourceStat, RuntimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(prior) = self.last_sample else {
            let now = self.clock.now();
            self.last_sample = Some(now);
            return Some(Ok(ResourceStat {
                cpu_usage_total: 0,
                cpu_usage_system: 0,
                prior_cpu_usage_total: 0,
                prior_cpu_usage_system: 0,
                memory_usage: self.memory_usage,
                memory_limit: self.memory_limit,
                sample_time: now,
                prior_sample_time: None,
            }));
        };

        if self.state.has_ended() {
            self.done = true;
            return None;
        }

        self.clock.sleep(self.interval);
        let now = self.clock.now();
        let elapsed_ns = (now - prior).num_nanoseconds().unwrap_or(0).max(0) as u64;

        let (prior_total, prior_system) = (self.cpu_total, self.cpu_system);
        self.cpu_system += elapsed_ns;
        self.cpu_total += (elapsed_ns as f64 * self.cpu_share) as u64;
        self.last_sample = Some(now);

        Some(Ok(ResourceStat {
            cpu_usage_total: self.cpu_total,
            cpu_usage_system: self.cpu_system,
            prior_cpu_usage_total: prior_total,
            prior_cpu_usage_system: prior_system,
            memory_usage: self.memory_usage,
            memory_limit: self.memory_limit,
            sample_time: now,
            prior_sample_time: Some(prior),
        }))
    }
}
