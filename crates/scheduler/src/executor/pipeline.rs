use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use greenbatch_core::{
    EnergySample, FileId, FileProcessStep, FileStateCode, PipelineRole, Pod, QueueEntry, POD_STATUS_DELETED,
};

use crate::energy::samples_to_kwh;
use crate::error::SchedulerError;
use crate::reconcile::copy_runtime_fields;

use super::core::QueueExecutor;

/// Background stat collection for one stage's pod.
struct EnergyGatherer {
    handle: JoinHandle<Result<Vec<EnergySample>, SchedulerError>>,
    cancel: Arc<AtomicBool>,
}

/// What every stage of one entry shares.
struct StageContext {
    file_id: FileId,
    timeout_at: DateTime<Utc>,
    ignore_timeout: bool,
}

impl QueueExecutor {
    /// Run one claimed entry through transfer, unpack and decode. Returns
    /// whether the entry's end time was stamped.
    pub(super) fn process_entry(&self, entry: &QueueEntry, ignore_timeout: bool) -> Result<bool, SchedulerError> {
        let started = self.clock.now();
        let concurrency = self.settings.max_concurrent_processors;
        self.store.update_metric(entry.file_id, |m| {
            m.start_time = Some(started);
            m.expected_duration_secs = Some(entry.expected_duration_secs);
            m.max_concurrency = Some(concurrency);
        })?;

        let stage = StageContext {
            file_id: entry.file_id,
            timeout_at: started + entry.expected_duration() * 2,
            ignore_timeout,
        };

        self.run_stage(PipelineRole::Transfer, &stage, &[entry.file_id])?;

        let downloaded = self.stage_inputs(entry.file_id, FileStateCode::Downloaded)?;
        self.run_stage(PipelineRole::Unpack, &stage, &downloaded)?;

        let unzipped = self.stage_inputs(entry.file_id, FileStateCode::Unzipped)?;
        self.run_stage(PipelineRole::Decode, &stage, &unzipped)?;

        let outputs: Vec<FileId> = downloaded.iter().chain(&unzipped).copied().collect();
        if self.all_finished(&outputs)? {
            let ended = self.clock.now();
            self.store.update_metric(entry.file_id, |m| m.end_time = Some(ended))?;
            info!(file = %entry.file_id, secs = (ended - started).num_milliseconds() as f64 / 1e3, "entry processed");
            Ok(true)
        } else {
            warn!(file = %entry.file_id, "derived files unfinished, end time not recorded");
            Ok(false)
        }
    }

    /// Files derived from `root` waiting for the stage that consumes `state`.
    fn stage_inputs(&self, root: FileId, state: FileStateCode) -> Result<Vec<FileId>, SchedulerError> {
        Ok(self
            .store
            .derived_files(root, state, FileProcessStep::New)?
            .into_iter()
            .map(|f| f.id)
            .collect())
    }

    fn all_finished(&self, files: &[FileId]) -> Result<bool, SchedulerError> {
        for id in files {
            if !self.store.get_file(*id)?.is_finished() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Launch a pod for `role` over `files` and wait for them to finish.
    fn run_stage(&self, role: PipelineRole, stage: &StageContext, files: &[FileId]) -> Result<(), SchedulerError> {
        if files.is_empty() {
            warn!(role = %role, file = %stage.file_id, "no input files for stage");
            return Ok(());
        }

        let started = self.clock.now();
        let pod_id = self.store.insert_pod(Pod::new(role, started))?.identifier;
        self.store.update_files(files, |f| f.pod = Some(pod_id))?;

        let launched = match self.runtime.run_pod_for_role(role, pod_id) {
            Ok(pod) => pod,
            Err(e) => {
                error!(role = %role, file = %stage.file_id, error = %e, "pod launch failed");
                self.release_stage(pod_id, files);
                return Err(e.into());
            }
        };
        let launched_at = self.clock.now();
        self.store.update_pod(pod_id, |p| {
            copy_runtime_fields(p, &launched);
            p.last_status_update = Some(launched_at);
        })?;
        debug!(role = %role, pod = %launched.name, files = files.len(), "stage launched");

        let gatherer = match self.spawn_energy_gatherer(role, pod_id, stage.file_id) {
            Ok(g) => g,
            Err(e) => {
                self.stop_pod(pod_id);
                return Err(e);
            }
        };

        match self.wait_for_files(role, stage, files) {
            Ok(true) => {}
            Ok(false) => {
                let err = self.abort_stage(role, stage, pod_id, files);
                self.discard_energy(role, gatherer);
                return Err(err);
            }
            Err(e) => {
                self.stop_pod(pod_id);
                self.discard_energy(role, gatherer);
                return Err(e);
            }
        }

        match gatherer.handle.join() {
            Ok(Ok(rows)) => {
                let samples = self.store.append_energy_samples(rows)?;
                debug!(role = %role, samples, "energy recorded");
            }
            Ok(Err(e)) => {
                warn!(role = %role, file = %stage.file_id, error = %e, "energy accounting failed");
                self.with_metrics(|m| m.record_energy_failure());
            }
            Err(_) => {
                error!(role = %role, file = %stage.file_id, "energy gatherer panicked");
                self.with_metrics(|m| m.record_energy_failure());
            }
        }

        let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
        self.with_metrics(|m| m.record_stage(role, elapsed));
        Ok(())
    }

    /// Poll until every file is finished. Returns false once the stage is
    /// past its timeout and out of grace polls.
    fn wait_for_files(&self, role: PipelineRole, stage: &StageContext, files: &[FileId]) -> Result<bool, SchedulerError> {
        let mut grace_polls = 0;
        loop {
            if self.all_finished(files)? {
                return Ok(true);
            }
            if self.clock.now() > stage.timeout_at {
                if !stage.ignore_timeout || grace_polls >= self.settings.timeout_grace_polls {
                    return Ok(false);
                }
                if grace_polls == 0 {
                    warn!(role = %role, file = %stage.file_id, "stage past its timeout, waiting");
                }
                grace_polls += 1;
            }
            self.clock.sleep(self.settings.poll_interval);
        }
    }

    /// Undo a stage whose pod never started: detach its files so the entry
    /// can run again.
    fn release_stage(&self, pod_id: Uuid, files: &[FileId]) {
        if let Err(e) = self.store.update_files(files, |f| f.pod = None) {
            warn!(pod = %pod_id, error = %e, "failed to detach files from unlaunched pod");
        }
        if let Err(e) = self.store.update_pod(pod_id, |p| p.status = POD_STATUS_DELETED.to_string()) {
            warn!(pod = %pod_id, error = %e, "failed to record unlaunched pod");
        }
    }

    /// Stop the gatherer of an aborted stage and drop what it collected.
    fn discard_energy(&self, role: PipelineRole, gatherer: EnergyGatherer) {
        gatherer.cancel.store(true, Ordering::SeqCst);
        match gatherer.handle.join() {
            Ok(Ok(rows)) => debug!(role = %role, dropped = rows.len(), "energy of aborted stage discarded"),
            Ok(Err(e)) => debug!(role = %role, error = %e, "energy gatherer of aborted stage failed"),
            Err(_) => error!(role = %role, "energy gatherer panicked"),
        }
    }

    /// Force-delete the pod and record it as deleted.
    fn stop_pod(&self, pod_id: Uuid) {
        if let Err(e) = self.runtime.delete_pod(pod_id, true) {
            warn!(pod = %pod_id, error = %e, "failed to delete pod");
        }
        if let Err(e) = self.store.update_pod(pod_id, |p| p.status = POD_STATUS_DELETED.to_string()) {
            warn!(pod = %pod_id, error = %e, "failed to record pod deletion");
        }
    }

    /// Force-delete the pod and fail its files.
    fn abort_stage(&self, role: PipelineRole, stage: &StageContext, pod_id: Uuid, files: &[FileId]) -> SchedulerError {
        error!(role = %role, file = %stage.file_id, pod = %pod_id, timeout = %stage.timeout_at, "stage timed out");

        self.stop_pod(pod_id);
        if let Err(e) = self.store.update_files(files, |f| {
            f.state = FileStateCode::Error;
            f.step = FileProcessStep::Finished;
        }) {
            return e.into();
        }
        self.with_metrics(|m| m.record_timeout());

        SchedulerError::StageTimeout {
            role,
            file_id: stage.file_id,
            pod: pod_id,
        }
    }

    /// Collect the pod's resource stats until it exits and convert them to
    /// energy samples of `file_id`. The caller stores them; a cancelled
    /// gatherer returns none.
    fn spawn_energy_gatherer(&self, role: PipelineRole, pod_id: Uuid, file_id: FileId) -> Result<EnergyGatherer, SchedulerError> {
        let runtime = Arc::clone(&self.runtime);
        let memory = self.settings.system_memory_bytes;
        let energy = self.settings.energy.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name(format!("energy-{}", role.stage_name()))
            .spawn(move || -> Result<Vec<EnergySample>, SchedulerError> {
                let mut samples = Vec::new();
                for stat in runtime.stream_resource_stats(pod_id)? {
                    if cancelled.load(Ordering::SeqCst) {
                        return Ok(Vec::new());
                    }
                    samples.push(stat?);
                }
                if cancelled.load(Ordering::SeqCst) {
                    return Ok(Vec::new());
                }
                Ok(samples_to_kwh(&samples, memory, &energy)?
                    .into_iter()
                    .map(|(at, kwh)| EnergySample::new(file_id, at, kwh))
                    .collect())
            })
            .map_err(|e| SchedulerError::Spawn(format!("energy gatherer: {}", e)))?;
        Ok(EnergyGatherer { handle, cancel })
    }
}
