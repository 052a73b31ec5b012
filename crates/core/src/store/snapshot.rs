use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::file::SourceFile;
use crate::metric::{EnergySample, Metric};
use crate::pod::Pod;
use crate::queue::TaskQueue;

use super::error::StoreError;
use super::operations::lock_queue;
use super::{read, Store};

/// Serializable image of the whole [`Store`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub files: Vec<SourceFile>,
    pub metrics: Vec<Metric>,
    pub energy_samples: Vec<EnergySample>,
    pub pods: Vec<Pod>,
    pub queues: Vec<TaskQueue>,
}

impl Store {
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let mut queues = Vec::new();
        for q in read(&self.queues, "queues")?.iter() {
            queues.push(lock_queue(q)?.clone());
        }
        Ok(StoreSnapshot {
            files: self.all_files()?,
            metrics: self.all_metrics()?,
            energy_samples: read(&self.energy, "energy")?.clone(),
            pods: self.all_pods()?,
            queues,
        })
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            files: RwLock::new(snapshot.files.into_iter().map(|f| (f.id, f)).collect()),
            metrics: RwLock::new(snapshot.metrics.into_iter().map(|m| (m.file_id, m)).collect()),
            energy: RwLock::new(snapshot.energy_samples),
            pods: RwLock::new(
                snapshot
                    .pods
                    .into_iter()
                    .map(|p| (p.identifier, p))
                    .collect::<HashMap<_, _>>(),
            ),
            queues: RwLock::new(
                snapshot
                    .queues
                    .into_iter()
                    .map(|q| Arc::new(Mutex::new(q)))
                    .collect(),
            ),
        }
    }

    /// Write the state as pretty JSON, creating parent directories.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        info!(
            path = %path.display(),
            files = snapshot.files.len(),
            queues = snapshot.queues.len(),
            "state snapshot saved"
        );
        Ok(())
    }

    /// Load state from `path`, or start empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            info!(path = %path.display(), "no state snapshot, starting empty");
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&json)?;
        Ok(Self::from_snapshot(snapshot))
    }
}
