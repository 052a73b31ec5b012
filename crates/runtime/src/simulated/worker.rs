use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};
use uuid::Uuid;

use greenbatch_core::{FileProcessStep, FileStateCode, PipelineRole, SourceFile, Store, TimeSource};

use super::{PodState, SimulationSettings, STATUS_FAILED, STATUS_SUCCEEDED};
use crate::error::RuntimeError;

/// Tick used while a hanging pod waits to be deleted.
const HANG_TICK: Duration = Duration::from_millis(50);

/// Body of one simulated pod thread.
pub(super) struct Worker {
    pub role: PipelineRole,
    pub identifier: Uuid,
    pub store: Arc<Store>,
    pub clock: Arc<dyn TimeSource>,
    pub settings: SimulationSettings,
    pub state: Arc<PodState>,
}

impl Worker {
    pub fn run_to_completion(self) {
        match self.run() {
            Ok(processed) => {
                info!(pod = %self.identifier, role = %self.role, processed, "simulated pod finished");
                self.state.exit(STATUS_SUCCEEDED);
            }
            Err(e) => {
                error!(pod = %self.identifier, role = %self.role, error = %e, "simulated pod failed");
                self.state.exit(STATUS_FAILED);
            }
        }
    }

    fn run(&self) -> Result<usize, RuntimeError> {
        let files = self.store.files_assigned_to_pod(self.identifier)?;
        let mut processed = 0;
        for file in files.into_iter().filter(|f| !f.is_finished()) {
            if self.state.is_deleted() {
                break;
            }
            self.store.update_file(file.id, |f| {
                if !f.is_finished() {
                    f.step = FileProcessStep::Processing;
                }
            })?;

            if !self.work_for(file.size) {
                debug!(pod = %self.identifier, file = %file.path, "pod deleted mid-file");
                break;
            }

            match self.role {
                PipelineRole::Transfer => {
                    let key = file.path.split_once('/').map_or(file.path.as_str(), |(_, k)| k);
                    let path = SourceFile::bucket_path(&self.settings.processing_bucket, key);
                    self.derive(&file, path, FileStateCode::Downloaded)?;
                    self.store.update_file(file.id, |f| f.step = FileProcessStep::Finished)?;
                }
                PipelineRole::Unpack => {
                    self.derive(&file, format!("{}.unzipped", file.path), FileStateCode::Unzipped)?;
                    self.store.update_file(file.id, |f| f.step = FileProcessStep::Finished)?;
                }
                PipelineRole::Decode => {
                    self.store.update_file(file.id, |f| {
                        f.state = FileStateCode::Unpickled;
                        f.step = FileProcessStep::Finished;
                    })?;
                }
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Spend the simulated processing time for `size` bytes. Returns false
    /// if the pod was deleted first.
    fn work_for(&self, size: u64) -> bool {
        if self.settings.hang {
            while !self.state.is_deleted() {
                self.clock.sleep(HANG_TICK);
            }
            return false;
        }
        if self.settings.processing_speed > 0.0 {
            self.clock
                .sleep(Duration::from_secs_f64(size as f64 / self.settings.processing_speed));
        }
        !self.state.is_deleted()
    }

    /// Record the output of a stage as a new file derived from the root of
    /// `parent`'s lineage.
    fn derive(&self, parent: &SourceFile, path: String, state: FileStateCode) -> Result<(), RuntimeError> {
        if self.store.find_file_by_path(&path)?.is_some() {
            debug!(path = %path, "derived file already tracked");
            return Ok(());
        }
        let root = parent.source_file.unwrap_or(parent.id);
        let child = SourceFile::new(path, parent.size, self.clock.now(), chrono::Duration::zero())
            .with_deadline(parent.deadline)
            .with_state(state)
            .with_source(root);
        self.store.insert_file(child)?;
        Ok(())
    }
}
