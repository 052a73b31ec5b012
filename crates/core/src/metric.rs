use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::file::FileId;
use crate::time::{duration_as_secs_f64, duration_from_secs_f64};

/// Execution telemetry of one source file (one-to-one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub file_id: FileId,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub expected_duration_secs: Option<f64>,
    /// Concurrency in effect when the job ran. Diagnostic only.
    pub max_concurrency: Option<u32>,
}

impl Metric {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            start_time: None,
            end_time: None,
            expected_duration_secs: None,
            max_concurrency: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }

    pub fn expected_duration(&self) -> Option<Duration> {
        self.expected_duration_secs.map(duration_from_secs_f64)
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Bytes per second for a file of `size` bytes. `None` when incomplete or
    /// the measured duration is not positive.
    pub fn processing_speed(&self, size: u64) -> Option<f64> {
        let secs = duration_as_secs_f64(self.duration()?);
        (secs > 0.0).then(|| size as f64 / secs)
    }

    /// `100 * (expected - actual) / actual`, rounded to two decimals.
    pub fn percentage_error(&self) -> Option<f64> {
        let actual = duration_as_secs_f64(self.duration()?);
        let expected = self.expected_duration_secs?;
        if actual == 0.0 {
            return None;
        }
        let pct = 100.0 * (expected - actual) / actual;
        Some((pct * 100.0).round() / 100.0)
    }

    /// Positive when the job finished after its deadline.
    pub fn difference_with_deadline(&self, deadline: DateTime<Utc>) -> Option<Duration> {
        self.end_time.map(|end| end - deadline)
    }
}

/// Energy attributed to a metric over one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    pub id: Uuid,
    pub file_id: FileId,
    pub timestamp: DateTime<Utc>,
    pub kwh: f64,
}

impl EnergySample {
    pub fn new(file_id: FileId, timestamp: DateTime<Utc>, kwh: f64) -> Self {
        Self { id: Uuid::new_v4(), file_id, timestamp, kwh }
    }
}
