mod error;
mod operations;
mod snapshot;

pub use error::StoreError;
pub use operations::{lock_queue, ClearedCounts};
pub use snapshot::StoreSnapshot;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::file::{FileId, SourceFile};
use crate::metric::{EnergySample, Metric};
use crate::pod::Pod;
use crate::queue::TaskQueue;
use crate::state::{FileProcessStep, FileStateCode};

/// A task queue behind its own lock. Workers claim entries through this
/// mutex; holding it never blocks access to the rest of the store.
pub type SharedTaskQueue = Arc<Mutex<TaskQueue>>;

/// Thread-safe persisted state of the scheduler.
///
/// Tables live behind independent `RwLock`s:
/// ```text
/// files     FileId -> SourceFile   (path unique)
/// metrics   FileId -> Metric       (one per source file)
/// energy    append-only EnergySample log
/// pods      identifier -> Pod
/// queues    ordered list of SharedTaskQueue
/// ```
/// The whole state can be written to and restored from a JSON snapshot.
#[derive(Default)]
pub struct Store {
    files: RwLock<HashMap<FileId, SourceFile>>,
    metrics: RwLock<HashMap<FileId, Metric>>,
    energy: RwLock<Vec<EnergySample>>,
    pods: RwLock<HashMap<Uuid, Pod>>,
    queues: RwLock<Vec<SharedTaskQueue>>,
}

pub(super) fn read<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockReadGuard<'a, T>, StoreError> {
    lock.read()
        .map_err(|e| StoreError::LockPoisoned(format!("{} read lock: {}", table, e)))
}

pub(super) fn write<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockWriteGuard<'a, T>, StoreError> {
    lock.write()
        .map_err(|e| StoreError::LockPoisoned(format!("{} write lock: {}", table, e)))
}

/// Deterministic ordering for file query results.
fn sorted(mut files: Vec<SourceFile>) -> Vec<SourceFile> {
    files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
    files
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Files ───────────────────────────────────────────────────

    /// Track a file found in object storage. Returns the tracked record and
    /// whether it was newly created. A file already tracked under the same
    /// path is returned unchanged. New files get an empty [`Metric`].
    pub fn register_discovered_file(
        &self,
        path: &str,
        size: u64,
        now: DateTime<Utc>,
        deadline_offset: Duration,
    ) -> Result<(SourceFile, bool), StoreError> {
        let mut files = write(&self.files, "files")?;
        if let Some(existing) = files.values().find(|f| f.path == path) {
            return Ok((existing.clone(), false));
        }

        let file = SourceFile::new(path, size, now, deadline_offset);
        files.insert(file.id, file.clone());
        drop(files);

        write(&self.metrics, "metrics")?
            .entry(file.id)
            .or_insert_with(|| Metric::new(file.id));
        debug!(path = %path, size, "registered discovered file");
        Ok((file, true))
    }

    /// Insert a file record. Paths are unique.
    pub fn insert_file(&self, file: SourceFile) -> Result<SourceFile, StoreError> {
        let mut files = write(&self.files, "files")?;
        if files.values().any(|f| f.path == file.path) {
            return Err(StoreError::DuplicatePath(file.path));
        }
        files.insert(file.id, file.clone());
        Ok(file)
    }

    pub fn get_file(&self, id: FileId) -> Result<SourceFile, StoreError> {
        read(&self.files, "files")?
            .get(&id)
            .cloned()
            .ok_or(StoreError::FileNotFound(id))
    }

    pub fn find_file_by_path(&self, path: &str) -> Result<Option<SourceFile>, StoreError> {
        Ok(read(&self.files, "files")?.values().find(|f| f.path == path).cloned())
    }

    /// Files matching `predicate`, ordered by creation time then path.
    pub fn files_where(&self, predicate: impl Fn(&SourceFile) -> bool) -> Result<Vec<SourceFile>, StoreError> {
        let files = read(&self.files, "files")?;
        Ok(sorted(files.values().filter(|&f| predicate(f)).cloned().collect()))
    }

    pub fn all_files(&self) -> Result<Vec<SourceFile>, StoreError> {
        self.files_where(|_| true)
    }

    /// Files awaiting scheduling: stage pending and step new.
    pub fn pending_files(&self) -> Result<Vec<SourceFile>, StoreError> {
        self.files_where(SourceFile::is_pending_new)
    }

    /// Files derived from `source` in the given stage and step.
    pub fn derived_files(
        &self,
        source: FileId,
        state: FileStateCode,
        step: FileProcessStep,
    ) -> Result<Vec<SourceFile>, StoreError> {
        self.files_where(|f| f.source_file == Some(source) && f.state == state && f.step == step)
    }

    pub fn files_assigned_to_pod(&self, pod: Uuid) -> Result<Vec<SourceFile>, StoreError> {
        self.files_where(|f| f.pod == Some(pod))
    }

    /// Apply `f` to one file and return the updated record.
    pub fn update_file(&self, id: FileId, f: impl FnOnce(&mut SourceFile)) -> Result<SourceFile, StoreError> {
        let mut files = write(&self.files, "files")?;
        let file = files.get_mut(&id).ok_or(StoreError::FileNotFound(id))?;
        f(file);
        Ok(file.clone())
    }

    /// Apply `f` to every listed file under a single write lock.
    pub fn update_files(&self, ids: &[FileId], f: impl Fn(&mut SourceFile)) -> Result<(), StoreError> {
        let mut files = write(&self.files, "files")?;
        if let Some(missing) = ids.iter().find(|id| !files.contains_key(id)) {
            return Err(StoreError::FileNotFound(*missing));
        }
        for id in ids {
            if let Some(file) = files.get_mut(id) {
                f(file);
            }
        }
        Ok(())
    }

    pub fn file_count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.files, "files")?.len())
    }

    // ── Metrics ─────────────────────────────────────────────────

    pub fn get_metric(&self, file_id: FileId) -> Result<Metric, StoreError> {
        read(&self.metrics, "metrics")?
            .get(&file_id)
            .cloned()
            .ok_or(StoreError::MetricNotFound(file_id))
    }

    /// Apply `f` to a metric, creating it first if the file has none.
    pub fn update_metric(&self, file_id: FileId, f: impl FnOnce(&mut Metric)) -> Result<Metric, StoreError> {
        let mut metrics = write(&self.metrics, "metrics")?;
        let metric = metrics.entry(file_id).or_insert_with(|| Metric::new(file_id));
        f(metric);
        Ok(metric.clone())
    }

    pub fn all_metrics(&self) -> Result<Vec<Metric>, StoreError> {
        let mut metrics: Vec<Metric> = read(&self.metrics, "metrics")?.values().cloned().collect();
        metrics.sort_by_key(|m| (m.start_time, m.file_id));
        Ok(metrics)
    }

    // ── Energy ──────────────────────────────────────────────────

    pub fn append_energy_samples(&self, samples: Vec<EnergySample>) -> Result<usize, StoreError> {
        let n = samples.len();
        write(&self.energy, "energy")?.extend(samples);
        Ok(n)
    }

    pub fn energy_samples(&self, file_id: FileId) -> Result<Vec<EnergySample>, StoreError> {
        Ok(read(&self.energy, "energy")?
            .iter()
            .filter(|s| s.file_id == file_id)
            .cloned()
            .collect())
    }

    /// Total energy recorded against a file's metric.
    pub fn total_kwh(&self, file_id: FileId) -> Result<f64, StoreError> {
        Ok(read(&self.energy, "energy")?
            .iter()
            .filter(|s| s.file_id == file_id)
            .map(|s| s.kwh)
            .sum())
    }
}
