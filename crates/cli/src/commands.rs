use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{info, warn};

use greenbatch_core::FileProcessStep;
use greenbatch_scheduler::{full_reset, run_guarded, ExecutionReport};

use crate::app::App;

/// Outcome of one guarded schedule + execute cycle.
#[derive(Debug)]
pub enum GatherCycle {
    /// Nothing pending, or no forecast to plan against.
    Idle,
    Ran(ExecutionReport),
}

pub fn schedule(app: &App) -> Result<()> {
    match app.builder.build_schedule().context("scheduling cycle failed")? {
        Some(id) => info!(queue = %id, "task queue created"),
        None => info!("nothing to schedule"),
    }
    app.save()
}

pub fn execute(app: &App, instantly: bool, ignore_timeout: bool) -> Result<()> {
    let report = app
        .executor
        .execute_ready_queues(instantly, ignore_timeout)
        .context("queue execution failed")?;
    info!(
        queues = report.queues,
        completed = report.completed,
        timeouts = report.timeouts,
        "execution finished"
    );
    app.save()
}

pub fn reconcile(app: &App) -> Result<()> {
    let report = app.reconciler.reconcile().context("pod reconciliation failed")?;
    info!(
        updated = report.updated,
        inserted = report.inserted,
        marked_deleted = report.marked_deleted,
        "pods reconciled"
    );
    app.save()
}

pub fn reset(app: &App, yes: bool) -> Result<()> {
    if !yes {
        bail!("reset deletes every object in {:?} and all tracked state; pass --yes to confirm", app.buckets());
    }
    let report = full_reset(&app.store, app.storage.as_ref(), &app.buckets()).context("reset failed")?;
    info!(
        objects = report.objects_deleted,
        files = report.cleared.files,
        pods = report.cleared.pods,
        queues = report.cleared.queues,
        "reset complete"
    );
    app.save()
}

/// Schedule and immediately execute under the reset guard.
pub fn gather_cycle(app: &App) -> Result<GatherCycle> {
    let buckets = app.buckets();
    let cycle = run_guarded(&app.store, app.storage.as_ref(), &buckets, || {
        if app.builder.build_schedule()?.is_none() {
            return Ok(GatherCycle::Idle);
        }
        Ok(GatherCycle::Ran(app.executor.execute_ready_queues(true, true)?))
    })
    .context("data gathering cycle failed");
    app.save()?;
    cycle
}

pub fn gather(app: &App, max_cycles: u32, shutdown: &AtomicBool) -> Result<()> {
    for cycle in 1..=max_cycles {
        if shutdown.load(Ordering::Relaxed) {
            warn!(cycle, "shutdown requested, stopping data gathering");
            return Ok(());
        }
        match gather_cycle(app)? {
            GatherCycle::Idle => {
                info!(cycles = cycle - 1, "data gathering complete");
                return Ok(());
            }
            GatherCycle::Ran(report) => info!(
                cycle,
                completed = report.completed,
                timeouts = report.timeouts,
                "data gathering cycle done"
            ),
        }
    }
    warn!(max_cycles, "data gathering stopped at cycle limit");
    Ok(())
}

pub fn status(app: &App) -> Result<serde_json::Value> {
    let files = app.store.all_files()?;
    let count = |step: FileProcessStep| files.iter().filter(|f| f.step == step).count();
    let pods = app.store.all_pods()?;
    let live_pods = app.runtime.get_pods(None)?;
    let queues = app.store.queues()?;
    let metrics = app.executor.metrics()?;

    Ok(json!({
        "files": {
            "total": files.len(),
            "new": count(FileProcessStep::New),
            "scheduled": count(FileProcessStep::Scheduled),
            "processing": count(FileProcessStep::Processing),
            "finished": count(FileProcessStep::Finished),
        },
        "pods": { "tracked": pods.len(), "live": live_pods.len() },
        "queues": queues.len(),
        "processing_speed": app.builder.estimator().estimate()?,
        "executor": metrics,
        "config": app.config.redacted_summary(),
    }))
}
