use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::pod::Pod;
use crate::queue::{QueueId, TaskQueue};

use super::error::StoreError;
use super::{read, write, SharedTaskQueue, Store};

/// Row counts removed by [`Store::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedCounts {
    pub files: usize,
    pub metrics: usize,
    pub energy_samples: usize,
    pub pods: usize,
    pub queues: usize,
}

impl Store {
    // ── Pods ────────────────────────────────────────────────────

    pub fn insert_pod(&self, pod: Pod) -> Result<Pod, StoreError> {
        write(&self.pods, "pods")?.insert(pod.identifier, pod.clone());
        Ok(pod)
    }

    pub fn get_pod(&self, identifier: Uuid) -> Result<Pod, StoreError> {
        read(&self.pods, "pods")?
            .get(&identifier)
            .cloned()
            .ok_or(StoreError::PodNotFound(identifier))
    }

    pub fn update_pod(&self, identifier: Uuid, f: impl FnOnce(&mut Pod)) -> Result<Pod, StoreError> {
        let mut pods = write(&self.pods, "pods")?;
        let pod = pods.get_mut(&identifier).ok_or(StoreError::PodNotFound(identifier))?;
        f(pod);
        Ok(pod.clone())
    }

    /// Pods ordered by creation time.
    pub fn all_pods(&self) -> Result<Vec<Pod>, StoreError> {
        let mut pods: Vec<Pod> = read(&self.pods, "pods")?.values().cloned().collect();
        pods.sort_by_key(|p| (p.created_at, p.identifier));
        Ok(pods)
    }

    // ── Queues ──────────────────────────────────────────────────

    /// Persist a new queue and return its shared handle.
    pub fn create_queue(&self, queue: TaskQueue) -> Result<SharedTaskQueue, StoreError> {
        let shared = Arc::new(Mutex::new(queue));
        write(&self.queues, "queues")?.push(Arc::clone(&shared));
        Ok(shared)
    }

    pub fn queues(&self) -> Result<Vec<SharedTaskQueue>, StoreError> {
        Ok(read(&self.queues, "queues")?.iter().map(Arc::clone).collect())
    }

    pub fn queue(&self, id: QueueId) -> Result<Option<SharedTaskQueue>, StoreError> {
        for q in read(&self.queues, "queues")?.iter() {
            if lock_queue(q)?.id == id {
                return Ok(Some(Arc::clone(q)));
            }
        }
        Ok(None)
    }

    /// Queues due at `now` (or all of them when `instantly`) that still have
    /// unpopped entries, ordered by start time.
    pub fn ready_queues(&self, now: DateTime<Utc>, instantly: bool) -> Result<Vec<SharedTaskQueue>, StoreError> {
        let mut ready = Vec::new();
        for q in read(&self.queues, "queues")?.iter() {
            let guard = lock_queue(q)?;
            if (instantly || guard.is_ready(now)) && guard.has_unpopped_entries() {
                ready.push((guard.start_time, Arc::clone(q)));
            }
        }
        ready.sort_by_key(|(start, _)| *start);
        Ok(ready.into_iter().map(|(_, q)| q).collect())
    }

    // ── Reset ───────────────────────────────────────────────────

    /// Drop every queue.
    pub fn clear_queues(&self) -> Result<usize, StoreError> {
        let mut queues = write(&self.queues, "queues")?;
        let n = queues.len();
        queues.clear();
        Ok(n)
    }

    /// Delete all files, metrics, energy samples, pods and queues.
    pub fn clear_all(&self) -> Result<ClearedCounts, StoreError> {
        let counts = ClearedCounts {
            files: drain_len(&mut *write(&self.files, "files")?),
            metrics: drain_len(&mut *write(&self.metrics, "metrics")?),
            energy_samples: {
                let mut energy = write(&self.energy, "energy")?;
                let n = energy.len();
                energy.clear();
                n
            },
            pods: drain_len(&mut *write(&self.pods, "pods")?),
            queues: self.clear_queues()?,
        };
        info!(
            files = counts.files,
            metrics = counts.metrics,
            pods = counts.pods,
            queues = counts.queues,
            "store cleared"
        );
        Ok(counts)
    }
}

fn drain_len<K, V>(map: &mut std::collections::HashMap<K, V>) -> usize {
    let n = map.len();
    map.clear();
    n
}

/// Lock one queue, mapping poisoning to [`StoreError::LockPoisoned`].
pub fn lock_queue(queue: &SharedTaskQueue) -> Result<std::sync::MutexGuard<'_, TaskQueue>, StoreError> {
    queue
        .lock()
        .map_err(|e| StoreError::LockPoisoned(format!("task queue lock: {}", e)))
}
