use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use greenbatch_core::PipelineRole;

/// Progress through the queue currently being executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completed share in `[0, 1]`. An empty queue counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Executor operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorMetrics {
    /// Entries that ran all three stages.
    pub entries_completed: u64,
    pub stage_timeouts: u64,
    /// Stages whose energy could not be accounted.
    pub energy_failures: u64,
    pub stages_completed: HashMap<String, u64>,
    /// Average stage duration by role.
    pub avg_stage_duration: HashMap<String, Duration>,
    pub last_completion: Option<DateTime<Utc>>,
    pub progress: Progress,
}

impl ExecutorMetrics {
    /// Record a completed stage.
    pub fn record_stage(&mut self, role: PipelineRole, duration: Duration) {
        let name = role.stage_name();
        *self.stages_completed.entry(name.to_string()).or_default() += 1;

        let count = self.stages_completed[name];
        let prev_avg = self.avg_stage_duration.get(name).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            Duration::from_nanos((prev_nanos + (cur_nanos - prev_nanos) / count as f64) as u64)
        };
        self.avg_stage_duration.insert(name.to_string(), new_avg);
    }

    pub fn start_queue(&mut self, total: usize) {
        self.progress = Progress { completed: 0, total };
    }

    /// Record an entry that left the pipeline, successfully or not.
    pub fn record_entry(&mut self, completed: bool, at: DateTime<Utc>) {
        self.progress.completed += 1;
        if completed {
            self.entries_completed += 1;
            self.last_completion = Some(at);
        }
    }

    pub fn record_timeout(&mut self) {
        self.stage_timeouts += 1;
    }

    pub fn record_energy_failure(&mut self) {
        self.energy_failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_average_is_incremental() {
        let mut m = ExecutorMetrics::default();
        m.record_stage(PipelineRole::Unpack, Duration::from_millis(100));
        m.record_stage(PipelineRole::Unpack, Duration::from_millis(200));

        assert_eq!(m.stages_completed["unpack"], 2);
        let avg = m.avg_stage_duration["unpack"].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert!(!m.stages_completed.contains_key("decode"));
    }

    #[test]
    fn progress_counts_failed_entries() {
        let mut m = ExecutorMetrics::default();
        m.start_queue(4);
        m.record_entry(true, Utc::now());
        m.record_entry(false, Utc::now());
        assert_eq!(m.progress, Progress { completed: 2, total: 4 });
        assert_eq!(m.progress.fraction(), 0.5);
        assert_eq!(m.entries_completed, 1);
    }

    #[test]
    fn empty_queue_is_complete() {
        assert_eq!(Progress::default().fraction(), 1.0);
    }
}
