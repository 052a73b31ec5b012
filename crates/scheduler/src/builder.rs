use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use greenbatch_core::config::SchedulingConfig;
use greenbatch_core::{
    duration_as_secs_f64, duration_from_secs_f64, FileId, FileProcessStep, QueueEntry, QueueId, SourceFile, Store,
    TaskQueue, TimeSource,
};
use greenbatch_forecast::ForecastProvider;
use greenbatch_storage::ObjectStorage;

use crate::error::SchedulerError;
use crate::speed::ProcessingSpeedEstimator;

/// Plans one task queue per cycle, centred on the forecast's renewable peak.
pub struct ScheduleBuilder {
    store: Arc<Store>,
    storage: Arc<dyn ObjectStorage>,
    forecast: Arc<dyn ForecastProvider>,
    clock: Arc<dyn TimeSource>,
    estimator: ProcessingSpeedEstimator,
    config: SchedulingConfig,
    pending_bucket: String,
}

impl ScheduleBuilder {
    pub fn new(
        store: Arc<Store>,
        storage: Arc<dyn ObjectStorage>,
        forecast: Arc<dyn ForecastProvider>,
        clock: Arc<dyn TimeSource>,
        config: SchedulingConfig,
        pending_bucket: impl Into<String>,
    ) -> Self {
        let estimator = ProcessingSpeedEstimator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.no_data_default_processing_speed,
            config.sliding_window(),
        );
        Self {
            store,
            storage,
            forecast,
            clock,
            estimator,
            config,
            pending_bucket: pending_bucket.into(),
        }
    }

    pub fn estimator(&self) -> &ProcessingSpeedEstimator {
        &self.estimator
    }

    /// Register every untracked object of the pending bucket. Returns the
    /// number of newly tracked files.
    pub fn discover_files(&self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let deadline = self.config.default_file_deadline();
        let mut created = 0;
        for object in self.storage.list_all_files(&self.pending_bucket)? {
            let path = SourceFile::bucket_path(&object.bucket, &object.key);
            let (_, is_new) = self.store.register_discovered_file(&path, object.size, now, deadline)?;
            if is_new {
                created += 1;
            }
        }
        debug!(bucket = %self.pending_bucket, created, "file discovery");
        Ok(created)
    }

    /// Discover files and queue every pending one. Returns the new queue's
    /// id, or `None` when nothing is pending or no forecast is available.
    pub fn build_schedule(&self) -> Result<Option<QueueId>, SchedulerError> {
        self.discover_files()?;

        let pending = self.store.pending_files()?;
        if pending.is_empty() {
            info!("no pending files, nothing to schedule");
            return Ok(None);
        }

        let speed = self.estimator.estimate()?;
        let planned: Vec<(SourceFile, Duration)> = pending
            .into_iter()
            .map(|f| {
                let expected = duration_from_secs_f64(f.size as f64 / speed);
                (f, expected)
            })
            .collect();

        let concurrency = self.config.max_concurrent_processors.max(1) as f64;
        let total_secs: f64 = planned.iter().map(|(_, d)| duration_as_secs_f64(*d)).sum::<f64>() / concurrency;

        let now = self.clock.now();
        let forecast = match self.forecast.renewable_percentage_until_last_available(now) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "renewable forecast unavailable, skipping schedule");
                return Ok(None);
            }
        };
        let Some(peak) = forecast.highest(None) else {
            warn!("renewable forecast is empty, skipping schedule");
            return Ok(None);
        };

        let start = peak.timestamp - duration_from_secs_f64(total_secs / 2.0);
        let mut queue = TaskQueue::new(start, now, self.config.deadline_buffer_percentage);
        queue.extend(planned.iter().map(|(file, expected)| QueueEntry::new(file, *expected)))?;

        let ids: Vec<FileId> = planned.iter().map(|(f, _)| f.id).collect();
        self.store.update_files(&ids, |f| f.step = FileProcessStep::Scheduled)?;

        let id = queue.id;
        self.store.create_queue(queue)?;
        info!(
            queue = %id,
            files = ids.len(),
            speed,
            peak = %peak.timestamp,
            peak_percentage = peak.percentage,
            start = %start,
            "created task queue"
        );
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};
    use greenbatch_core::{lock_queue, FakeTimeSource};
    use greenbatch_forecast::{FixedForecastProvider, RenewablePercentageForecast, RenewablePercentagePoint};
    use greenbatch_storage::InMemoryStorage;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn forecast(points: &[(i64, f64)]) -> Arc<FixedForecastProvider> {
        Arc::new(FixedForecastProvider::new(RenewablePercentageForecast::new(
            points
                .iter()
                .map(|(secs, pct)| RenewablePercentagePoint {
                    timestamp: now() + Duration::seconds(*secs),
                    percentage: *pct,
                })
                .collect(),
        )))
    }

    fn builder(store: &Arc<Store>, storage: &Arc<InMemoryStorage>, fc: Arc<FixedForecastProvider>) -> ScheduleBuilder {
        let config = SchedulingConfig {
            no_data_default_processing_speed: 25.0,
            ..SchedulingConfig::default()
        };
        ScheduleBuilder::new(
            Arc::clone(store),
            Arc::clone(storage) as Arc<dyn ObjectStorage>,
            fc,
            Arc::new(FakeTimeSource::new(now())),
            config,
            "pending",
        )
    }

    #[test]
    fn discovery_is_idempotent() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        storage.upload("pending", "a.zip", Bytes::from(vec![0u8; 100])).unwrap();
        let b = builder(&store, &storage, forecast(&[]));

        assert_eq!(b.discover_files().unwrap(), 1);
        assert_eq!(b.discover_files().unwrap(), 0);
        let file = store.find_file_by_path("pending/a.zip").unwrap().unwrap();
        assert_eq!(file.size, 100);
        assert_eq!(file.deadline, now() + Duration::days(1));
        assert!(store.get_metric(file.id).is_ok());
    }

    #[test]
    fn queue_starts_half_the_batch_before_peak() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        storage.upload("pending", "a.zip", Bytes::from(vec![0u8; 100])).unwrap();
        let b = builder(&store, &storage, forecast(&[(0, 20.0), (10, 80.0), (20, 40.0)]));

        let id = b.build_schedule().unwrap().unwrap();
        let queue = store.queue(id).unwrap().unwrap();
        let queue = lock_queue(&queue).unwrap();

        assert_eq!(queue.start_time, now() + Duration::seconds(8));
        assert_eq!(queue.len(), 1);
        let entry = &queue.entries()[0];
        assert_eq!(entry.expected_duration(), Duration::seconds(4));
        assert_eq!(
            entry.latest_feasible_start(queue.deadline_buffer),
            entry.file_deadline - Duration::milliseconds(4400)
        );
        assert_eq!(store.get_file(entry.file_id).unwrap().step, FileProcessStep::Scheduled);
    }

    #[test]
    fn batch_total_is_divided_by_concurrency() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        for key in ["a", "b", "c", "d"] {
            storage.upload("pending", key, Bytes::from(vec![0u8; 100])).unwrap();
        }
        let mut b = builder(&store, &storage, forecast(&[(100, 50.0)]));
        b.config.max_concurrent_processors = 2;

        let id = b.build_schedule().unwrap().unwrap();
        let queue = store.queue(id).unwrap().unwrap();
        let queue = lock_queue(&queue).unwrap();
        // 4 x 4s over 2 processors = 8s, centred on the peak
        assert_eq!(queue.start_time, now() + Duration::seconds(96));
        assert!(queue.entries().iter().all(|e| e.expected_duration() == Duration::seconds(4)));
    }

    #[test]
    fn nothing_pending_is_a_noop() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        let b = builder(&store, &storage, forecast(&[(10, 80.0)]));
        assert!(b.build_schedule().unwrap().is_none());
        assert!(store.queues().unwrap().is_empty());
    }

    #[test]
    fn empty_forecast_leaves_files_pending() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        storage.upload("pending", "a.zip", Bytes::from(vec![0u8; 10])).unwrap();
        let b = builder(&store, &storage, forecast(&[]));

        assert!(b.build_schedule().unwrap().is_none());
        assert_eq!(store.pending_files().unwrap().len(), 1);
    }

    #[test]
    fn scheduled_files_are_not_requeued() {
        let store = Arc::new(Store::new());
        let storage = Arc::new(InMemoryStorage::new());
        storage.upload("pending", "a.zip", Bytes::from(vec![0u8; 10])).unwrap();
        let b = builder(&store, &storage, forecast(&[(10, 80.0)]));

        assert!(b.build_schedule().unwrap().is_some());
        assert!(b.build_schedule().unwrap().is_none());
        assert_eq!(store.queues().unwrap().len(), 1);
    }
}
