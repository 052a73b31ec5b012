use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use greenbatch_core::{Store, TimeSource};

use crate::error::SchedulerError;

/// Median processing speed over recently completed jobs.
pub struct ProcessingSpeedEstimator {
    store: Arc<Store>,
    clock: Arc<dyn TimeSource>,
    /// Bytes per second used when no job qualifies.
    default_speed: f64,
    sliding_window: Duration,
}

impl ProcessingSpeedEstimator {
    pub fn new(store: Arc<Store>, clock: Arc<dyn TimeSource>, default_speed: f64, sliding_window: Duration) -> Self {
        Self {
            store,
            clock,
            default_speed,
            sliding_window,
        }
    }

    /// Bytes per second. Only metrics with both timestamps whose start lies
    /// strictly after `now - sliding_window` count; zero-length jobs are
    /// skipped.
    pub fn estimate(&self) -> Result<f64, SchedulerError> {
        let since = self.clock.now() - self.sliding_window;
        let mut speeds = Vec::new();
        for metric in self.store.all_metrics()? {
            if !metric.start_time.is_some_and(|start| start > since) {
                continue;
            }
            let file = match self.store.get_file(metric.file_id) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if let Some(speed) = metric.processing_speed(file.size) {
                speeds.push(speed);
            }
        }

        match median(&mut speeds) {
            Some(speed) => {
                debug!(samples = speeds.len(), speed, "estimated processing speed");
                Ok(speed)
            }
            None => {
                debug!(speed = self.default_speed, "no completed jobs in window, using default speed");
                Ok(self.default_speed)
            }
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use greenbatch_core::{FakeTimeSource, SourceFile};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn job(store: &Store, size: u64, started_ago: Duration, took: Duration) {
        let file = store
            .insert_file(SourceFile::new(format!("pending/{}", uuid::Uuid::new_v4()), size, now(), Duration::days(1)))
            .unwrap();
        let start = now() - started_ago;
        store
            .update_metric(file.id, |m| {
                m.start_time = Some(start);
                m.end_time = Some(start + took);
            })
            .unwrap();
    }

    fn estimator(store: Arc<Store>) -> ProcessingSpeedEstimator {
        ProcessingSpeedEstimator::new(store, Arc::new(FakeTimeSource::new(now())), 1000.0, Duration::days(30))
    }

    #[test]
    fn median_of_jobs_in_window() {
        let store = Arc::new(Store::new());
        job(&store, 100, Duration::days(1), Duration::seconds(4)); // 25
        job(&store, 100, Duration::days(2), Duration::seconds(1)); // 100
        job(&store, 100, Duration::days(3), Duration::seconds(10)); // 10
        job(&store, 100, Duration::days(31), Duration::seconds(100)); // outside window
        assert_eq!(estimator(store).estimate().unwrap(), 25.0);
    }

    #[test]
    fn even_count_averages_middle_pair() {
        let store = Arc::new(Store::new());
        job(&store, 100, Duration::hours(1), Duration::seconds(4)); // 25
        job(&store, 100, Duration::hours(2), Duration::seconds(2)); // 50
        assert_eq!(estimator(store).estimate().unwrap(), 37.5);
    }

    #[test]
    fn falls_back_to_default() {
        let store = Arc::new(Store::new());
        job(&store, 100, Duration::days(40), Duration::seconds(4));
        job(&store, 100, Duration::hours(1), Duration::zero());
        let incomplete = store
            .insert_file(SourceFile::new("pending/open.zip", 10, now(), Duration::days(1)))
            .unwrap();
        store.update_metric(incomplete.id, |m| m.start_time = Some(now())).unwrap();
        assert_eq!(estimator(store).estimate().unwrap(), 1000.0);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let store = Arc::new(Store::new());
        job(&store, 100, Duration::days(30), Duration::seconds(4));
        assert_eq!(estimator(Arc::clone(&store)).estimate().unwrap(), 1000.0);
    }
}
