use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info};

use crate::app::App;
use crate::commands::{self, GatherCycle};

/// Granularity at which idle loops notice shutdown.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(200);

/// Sleep for `total`, returning early once shutdown is requested.
/// Returns `false` when the loop should stop.
fn wait(total: Duration, shutdown: &AtomicBool) -> bool {
    let until = Instant::now() + total;
    while Instant::now() < until {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(SHUTDOWN_CHECK.min(until.saturating_duration_since(Instant::now())));
    }
    !shutdown.load(Ordering::Relaxed)
}

/// Run `step` every `interval` until shutdown. Failures are logged and the
/// loop keeps going.
fn periodic(name: &str, interval: Duration, shutdown: &AtomicBool, step: impl Fn() -> Result<()>) {
    info!(task = name, interval_secs = interval.as_secs(), "periodic task started");
    loop {
        let started = Instant::now();
        if let Err(e) = step() {
            error!(task = name, error = %format!("{:#}", e), "periodic task failed");
        }
        if !wait(interval.saturating_sub(started.elapsed()), shutdown) {
            break;
        }
    }
    info!(task = name, "periodic task stopped");
}

/// Run the schedule, execute and reconcile loops until `shutdown` is set.
///
/// In data-gathering mode the schedule loop is replaced by guarded
/// schedule + execute cycles on the execute interval.
pub fn run(app: &App, shutdown: &AtomicBool) {
    let s = &app.config.scheduling;
    let schedule_every = Duration::from_secs(s.create_schedule_interval_secs.max(1));
    let execute_every = Duration::from_secs(s.execute_task_queues_interval_secs.max(1));
    let reconcile_every = Duration::from_secs(s.update_pod_status_interval_secs.max(1));
    let gathering = s.automated_data_gathering;

    info!(gathering, "daemon starting");
    thread::scope(|scope| {
        if gathering {
            scope.spawn(|| {
                periodic("gather", execute_every, shutdown, || match commands::gather_cycle(app)? {
                    GatherCycle::Idle => Ok(()),
                    GatherCycle::Ran(report) => {
                        info!(completed = report.completed, timeouts = report.timeouts, "gather cycle done");
                        Ok(())
                    }
                })
            });
        } else {
            scope.spawn(|| periodic("schedule", schedule_every, shutdown, || commands::schedule(app)));
            scope.spawn(|| {
                periodic("execute", execute_every, shutdown, || commands::execute(app, false, false))
            });
        }
        scope.spawn(|| periodic("reconcile", reconcile_every, shutdown, || commands::reconcile(app)));
    });

    if let Err(e) = app.save() {
        error!(error = %format!("{:#}", e), "final state save failed");
    }
    info!("daemon stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn wait_returns_early_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!wait(Duration::from_secs(30), &shutdown));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn periodic_runs_until_shutdown() {
        let shutdown = AtomicBool::new(false);
        let runs = AtomicUsize::new(0);
        periodic("test", Duration::from_millis(1), &shutdown, || {
            if runs.fetch_add(1, Ordering::SeqCst) == 2 {
                shutdown.store(true, Ordering::SeqCst);
            }
            Ok(())
        });
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failing_step_keeps_looping() {
        let shutdown = AtomicBool::new(false);
        let runs = AtomicUsize::new(0);
        periodic("test", Duration::from_millis(1), &shutdown, || {
            if runs.fetch_add(1, Ordering::SeqCst) == 1 {
                shutdown.store(true, Ordering::SeqCst);
            }
            anyhow::bail!("boom")
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
