//! Background scheduler: fixed-interval metrics runs on a dedicated thread.
//!
//! Shutdown is checked between runs only; a run in flight always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::error::MetricsError;
use super::runner::MetricsRunner;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_secs(1);

/// Handle for the scheduler thread. Dropping it requests shutdown and
/// waits for the thread to finish.
pub struct MetricsSchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MetricsSchedulerHandle {
    /// Request graceful shutdown. A run already in progress completes.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Block until the scheduler thread exits.
    pub fn join(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for MetricsSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the scheduler. With `run_on_start` the first run fires
/// immediately, otherwise after one full interval.
pub fn start_scheduler(
    runner: Arc<MetricsRunner>,
    interval: Duration,
    run_on_start: bool,
) -> MetricsSchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_secs = interval.as_secs(), run_on_start, "Metrics scheduler started");
        scheduler_loop(&runner, interval, run_on_start, &flag);
        tracing::info!("Metrics scheduler shutting down");
    });

    MetricsSchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop(runner: &MetricsRunner, interval: Duration, run_on_start: bool, shutdown: &AtomicBool) {
    if run_on_start {
        scheduled_run(runner);
    }

    while !shutdown.load(Ordering::Relaxed) {
        if !sleep_unless_shutdown(interval, shutdown) {
            return;
        }
        scheduled_run(runner);
    }
}

/// Sleep for `total` in small steps. Returns `false` if shutdown was
/// requested meanwhile.
fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) -> bool {
    let mut slept = Duration::ZERO;
    while slept < total {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let step = SLEEP_GRANULARITY.min(total - slept);
        std::thread::sleep(step);
        slept += step;
    }
    !shutdown.load(Ordering::Relaxed)
}

fn scheduled_run(runner: &MetricsRunner) {
    match runner.run("scheduled", Utc::now().naive_utc()) {
        Ok(report) if report.has_failures() => tracing::warn!(
            practices_failed = report.practices_failed,
            periods_failed = report.periods_failed,
            evidence_rows_failed = report.evidence_rows_failed,
            "Scheduled metrics run finished with failures"
        ),
        Ok(_) => {}
        Err(MetricsError::RunInProgress) => {
            tracing::info!("Previous metrics run still in progress, skipping this tick")
        }
        Err(e) => tracing::error!(error = %e, "Scheduled metrics run failed, retrying next interval"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EtlConfig;
    use crate::db::PracticeRegistry;
    use crate::run_lock::RunLock;
    use std::time::Instant;

    fn empty_runner() -> Arc<MetricsRunner> {
        Arc::new(MetricsRunner::sqlite(
            &EtlConfig::default(),
            Arc::new(PracticeRegistry::default()),
            Arc::new(RunLock::new()),
        ))
    }

    #[test]
    fn shutdown_interrupts_long_interval() {
        let handle = start_scheduler(empty_runner(), Duration::from_secs(3600), false);
        let start = Instant::now();
        handle.shutdown();
        handle.join();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn drop_stops_thread() {
        let start = Instant::now();
        {
            let _handle = start_scheduler(empty_runner(), Duration::from_secs(3600), true);
        }
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn sleep_returns_false_on_shutdown() {
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless_shutdown(Duration::from_secs(60), &flag));
        let flag = AtomicBool::new(false);
        assert!(sleep_unless_shutdown(Duration::from_millis(10), &flag));
    }

    #[test]
    fn tick_during_held_lock_is_skipped() {
        let runner = empty_runner();
        let _held = runner.lock().try_acquire("manual").unwrap();
        // Logs and returns without blocking on the lock
        scheduled_run(&runner);
        assert_eq!(runner.lock().current_run().unwrap().trigger, "manual");
    }
}
