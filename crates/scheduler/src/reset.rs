use tracing::{error, info, warn};

use greenbatch_core::{ClearedCounts, Store};
use greenbatch_storage::ObjectStorage;

use crate::error::SchedulerError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub objects_deleted: usize,
    pub cleared: ClearedCounts,
}

/// Purge `buckets` and every tracked file, metric, energy sample, pod and
/// queue.
pub fn full_reset(store: &Store, storage: &dyn ObjectStorage, buckets: &[&str]) -> Result<ResetReport, SchedulerError> {
    let mut objects_deleted = 0;
    for bucket in buckets {
        objects_deleted += storage.delete_all_in_bucket(bucket)?;
    }
    let cleared = store.clear_all()?;
    warn!(objects_deleted, files = cleared.files, "full reset performed");
    Ok(ResetReport { objects_deleted, cleared })
}

/// Run a data-gathering step. If it fails, reset everything and return the
/// original error.
pub fn run_guarded<T>(
    store: &Store,
    storage: &dyn ObjectStorage,
    buckets: &[&str],
    step: impl FnOnce() -> Result<T, SchedulerError>,
) -> Result<T, SchedulerError> {
    match step() {
        Ok(value) => Ok(value),
        Err(e) => {
            error!(error = %e, "data gathering failed, resetting");
            match full_reset(store, storage, buckets) {
                Ok(report) => info!(objects_deleted = report.objects_deleted, "reset after failure complete"),
                Err(reset_err) => error!(error = %reset_err, "reset after failure failed"),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use greenbatch_core::{StoreError, TaskQueue};
    use greenbatch_storage::InMemoryStorage;

    use super::*;

    fn populated() -> (Store, InMemoryStorage) {
        let store = Store::new();
        let storage = InMemoryStorage::new();
        storage.upload("pending", "a", Bytes::from_static(b"1")).unwrap();
        storage.upload("processing", "b", Bytes::from_static(b"2")).unwrap();
        storage.upload("archive", "c", Bytes::from_static(b"3")).unwrap();
        store
            .register_discovered_file("pending/a", 1, Utc::now(), Duration::hours(1))
            .unwrap();
        store.create_queue(TaskQueue::new(Utc::now(), Utc::now(), 1.1)).unwrap();
        (store, storage)
    }

    #[test]
    fn reset_purges_buckets_and_store() {
        let (store, storage) = populated();
        let report = full_reset(&store, &storage, &["pending", "processing"]).unwrap();

        assert_eq!(report.objects_deleted, 2);
        assert_eq!(report.cleared.files, 1);
        assert_eq!(report.cleared.queues, 1);
        assert_eq!(store.file_count().unwrap(), 0);
        assert_eq!(storage.list_all_files("archive").unwrap().len(), 1);
    }

    #[test]
    fn guarded_success_keeps_state() {
        let (store, storage) = populated();
        let out = run_guarded(&store, &storage, &["pending"], || Ok(7)).unwrap();
        assert_eq!(out, 7);
        assert_eq!(store.file_count().unwrap(), 1);
    }

    #[test]
    fn guarded_failure_resets_and_reraises() {
        let (store, storage) = populated();
        let err = run_guarded(&store, &storage, &["pending", "processing"], || -> Result<(), SchedulerError> {
            Err(StoreError::FileNotFound(uuid::Uuid::nil()).into())
        })
        .unwrap_err();

        assert!(matches!(err, SchedulerError::Store(StoreError::FileNotFound(_))));
        assert_eq!(store.file_count().unwrap(), 0);
        assert!(store.queues().unwrap().is_empty());
        assert!(storage.list_all_files("pending").unwrap().is_empty());
    }
}
