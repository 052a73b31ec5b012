use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use greenbatch_core::{Pod, Store, StoreError, TimeSource, POD_STATUS_DELETED, POD_STATUS_PENDING};
use greenbatch_runtime::{ContainerRuntime, RuntimePod};

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub updated: usize,
    pub inserted: usize,
    pub marked_deleted: usize,
}

/// Mirrors the container runtime's pod list into the store.
pub struct PodReconciler {
    store: Arc<Store>,
    runtime: Arc<dyn ContainerRuntime>,
    clock: Arc<dyn TimeSource>,
}

impl PodReconciler {
    pub fn new(store: Arc<Store>, runtime: Arc<dyn ContainerRuntime>, clock: Arc<dyn TimeSource>) -> Self {
        Self { store, runtime, clock }
    }

    /// Upsert every live runtime pod and mark stored pods the runtime no
    /// longer reports as deleted. Pods never launched are left alone.
    pub fn reconcile(&self) -> Result<ReconcileReport, SchedulerError> {
        let now = self.clock.now();
        let live = self.runtime.get_pods(None)?;
        let live_ids: HashSet<Uuid> = live.iter().map(|p| p.identifier).collect();
        let mut report = ReconcileReport::default();

        for runtime_pod in &live {
            let apply = |pod: &mut Pod| {
                copy_runtime_fields(pod, runtime_pod);
                pod.last_status_update = Some(now);
            };
            match self.store.update_pod(runtime_pod.identifier, apply) {
                Ok(_) => report.updated += 1,
                Err(StoreError::PodNotFound(_)) => {
                    let mut pod = Pod::new(runtime_pod.role, runtime_pod.created_at);
                    pod.identifier = runtime_pod.identifier;
                    copy_runtime_fields(&mut pod, runtime_pod);
                    pod.last_status_update = Some(now);
                    self.store.insert_pod(pod)?;
                    report.inserted += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for pod in self.store.all_pods()? {
            if pod.is_deleted() || pod.status == POD_STATUS_PENDING || live_ids.contains(&pod.identifier) {
                continue;
            }
            self.store.update_pod(pod.identifier, |p| {
                p.status = POD_STATUS_DELETED.to_string();
                p.last_status_update = Some(now);
            })?;
            debug!(pod = %pod.identifier, "pod gone from runtime");
            report.marked_deleted += 1;
        }

        info!(
            updated = report.updated,
            inserted = report.inserted,
            deleted = report.marked_deleted,
            "reconciled pod status"
        );
        Ok(report)
    }
}

/// Copy what the runtime reports about a pod onto its stored record.
pub(crate) fn copy_runtime_fields(pod: &mut Pod, runtime_pod: &RuntimePod) {
    pod.name = Some(runtime_pod.name.clone());
    pod.namespace = Some(runtime_pod.namespace.clone());
    pod.ip = runtime_pod.ip.clone();
    pod.status = runtime_pod.status.clone();
    pod.labels = runtime_pod.labels.clone();
}
