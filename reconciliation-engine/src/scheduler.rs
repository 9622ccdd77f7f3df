//! Periodic batch runs over every scope with unmatched transactions.

use crate::config::SchedulerConfig;
use crate::matching::{Reconciler, RunTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to the background scheduler task.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the run in progress, if any, has finished.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// Start the scheduler, or return `None` when periodic runs are disabled.
pub fn spawn(reconciler: Arc<Reconciler>, config: &SchedulerConfig) -> Option<SchedulerHandle> {
    let interval = config.interval?;
    let limit = config.batch_limit;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        interval_secs = interval.as_secs(),
        batch_limit = limit,
        "Starting reconciliation scheduler"
    );

    let task = tokio::spawn(run_loop(reconciler, interval, limit, shutdown_rx));
    Some(SchedulerHandle { shutdown_tx, task })
}

async fn run_loop(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    limit: i64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; wait one full period after startup.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let summaries = reconciler.run_all_scopes(limit, RunTrigger::Scheduler).await;
                let matched: usize = summaries.iter().map(|s| s.matched).sum();
                let needs_review: usize = summaries.iter().map(|s| s.needs_review()).sum();
                info!(
                    scopes = summaries.len(),
                    matched,
                    needs_review,
                    "Scheduled reconciliation finished"
                );
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Reconciliation scheduler stopped");
}
