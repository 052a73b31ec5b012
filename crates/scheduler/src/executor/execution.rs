use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use rayon::ThreadPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use greenbatch_core::{lock_queue, QueueEntry, SharedTaskQueue};

use crate::error::SchedulerError;

use super::core::{ExecutionReport, QueueExecutor};

/// Tallies shared by the workers of one queue.
#[derive(Default)]
struct QueueRun {
    popped: Mutex<Vec<Uuid>>,
    completed: AtomicUsize,
    timeouts: AtomicUsize,
    /// Set by the first failing worker; the others stop claiming.
    aborted: AtomicBool,
    failure: Mutex<Option<SchedulerError>>,
}

impl QueueRun {
    fn fail(&self, err: SchedulerError) {
        self.aborted.store(true, Ordering::SeqCst);
        match self.failure.lock() {
            Ok(mut slot) => {
                if slot.is_none() {
                    *slot = Some(err);
                } else {
                    debug!(error = %err, "further failure in aborted queue run");
                }
            }
            Err(e) => warn!("queue failure lock poisoned: {}", e),
        }
    }
}

impl QueueExecutor {
    /// Run every queue whose start time has passed (or every queue when
    /// `instantly`) that still has unpopped entries, earliest start first.
    ///
    /// Stage timeouts are handled per entry. Any other failure stops the
    /// run: the failing entry goes back on its queue, the remaining entries
    /// stay unclaimed, and the error is returned so the next run retries.
    pub fn execute_ready_queues(&self, instantly: bool, ignore_timeout: bool) -> Result<ExecutionReport, SchedulerError> {
        let queues = self.store.ready_queues(self.clock.now(), instantly)?;
        if queues.is_empty() {
            debug!("no task queues ready");
            return Ok(ExecutionReport::default());
        }

        let workers = self.settings.max_concurrent_processors.max(1) as usize;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("greenbatch-worker-{}", i))
            .build()
            .map_err(|e| SchedulerError::ThreadPool(e.to_string()))?;

        let mut report = ExecutionReport::default();
        for queue in &queues {
            self.run_queue(&pool, workers, queue, ignore_timeout, &mut report)?;
        }
        Ok(report)
    }

    fn run_queue(
        &self,
        pool: &ThreadPool,
        workers: usize,
        queue: &SharedTaskQueue,
        ignore_timeout: bool,
        report: &mut ExecutionReport,
    ) -> Result<(), SchedulerError> {
        let (queue_id, total) = {
            let mut guard = lock_queue(queue)?;
            guard.has_started = true;
            (guard.id, guard.unpopped_count())
        };
        info!(queue = %queue_id, entries = total, workers, "executing task queue");
        self.with_metrics(|m| m.start_queue(total));

        let run = QueueRun::default();
        pool.scope(|scope| {
            for worker in 0..workers {
                let run = &run;
                scope.spawn(move |_| self.worker_loop(worker, queue, ignore_timeout, run));
            }
        });

        let popped = run
            .popped
            .into_inner()
            .map_err(|e| SchedulerError::LockPoisoned(format!("popped entries lock: {}", e)))?;
        let failure = run
            .failure
            .into_inner()
            .map_err(|e| SchedulerError::LockPoisoned(format!("queue failure lock: {}", e)))?;
        if let Some(err) = failure {
            error!(queue = %queue_id, error = %err, "task queue run aborted");
            return Err(err);
        }

        let completed = run.completed.into_inner();
        let timeouts = run.timeouts.into_inner();
        info!(queue = %queue_id, popped = popped.len(), completed, timeouts, "task queue drained");

        report.queues += 1;
        report.popped.extend(popped);
        report.completed += completed;
        report.timeouts += timeouts;
        Ok(())
    }

    /// Claim entries until the queue is empty. The queue lock is held only
    /// for the check-and-pop.
    fn worker_loop(&self, worker: usize, queue: &SharedTaskQueue, ignore_timeout: bool, run: &QueueRun) {
        loop {
            if run.aborted.load(Ordering::SeqCst) {
                debug!(worker, "queue run aborted, worker exiting");
                return;
            }
            let entry = {
                let mut guard = match lock_queue(queue) {
                    Ok(g) => g,
                    Err(e) => {
                        error!(worker, error = %e, "cannot lock task queue");
                        return;
                    }
                };
                if !guard.has_unpopped_entries() {
                    break;
                }
                match guard.pop() {
                    Ok(entry) => entry,
                    Err(_) => break,
                }
            };

            match run.popped.lock() {
                Ok(mut popped) => popped.push(entry.id),
                Err(e) => warn!(worker, "popped entries lock poisoned: {}", e),
            }
            debug!(worker, entry = %entry.id, file = %entry.file_id, "claimed entry");

            let outcome = self.process_entry(&entry, ignore_timeout);
            let now = self.clock.now();
            match outcome {
                Ok(completed) => {
                    run.completed.fetch_add(1, Ordering::Relaxed);
                    self.with_metrics(|m| m.record_entry(completed, now));
                }
                Err(e @ SchedulerError::StageTimeout { .. }) => {
                    warn!(worker, error = %e, "moving on after stage timeout");
                    run.timeouts.fetch_add(1, Ordering::Relaxed);
                    self.with_metrics(|m| m.record_entry(false, now));
                }
                Err(e) => {
                    error!(worker, entry = %entry.id, error = %e, "entry failed, aborting queue run");
                    self.requeue(queue, &entry);
                    run.fail(e);
                }
            }
        }
        debug!(worker, "worker exiting, queue empty");
    }

    /// Put a failed entry back so a later run claims it again.
    fn requeue(&self, queue: &SharedTaskQueue, entry: &QueueEntry) {
        let requeued = lock_queue(queue)
            .map_err(SchedulerError::from)
            .and_then(|mut q| q.requeue(entry.id).map_err(SchedulerError::from));
        match requeued {
            Ok(()) => info!(entry = %entry.id, file = %entry.file_id, "entry returned to queue"),
            Err(e) => error!(entry = %entry.id, error = %e, "failed to return entry to queue"),
        }
    }
}
