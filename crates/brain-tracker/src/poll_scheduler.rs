use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::reconcile::ReconcileEngine;

/// Handle to the background poll loop. A zero interval yields a disabled handle.
#[derive(Debug)]
pub struct PollSchedulerHandle {
    interval: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollSchedulerHandle {
    fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Runs `reconcile_all` every `interval`, first pass one interval after start.
pub fn start_poll_scheduler(engine: Arc<ReconcileEngine>, interval: Duration) -> PollSchedulerHandle {
    if interval.is_zero() {
        tracing::info!("tracker poll scheduler disabled");
        return PollSchedulerHandle::disabled();
    }
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_poll_loop(engine, interval, shutdown_rx));
    tracing::info!(interval_ms = interval.as_millis() as u64, "tracker poll scheduler started");
    PollSchedulerHandle {
        interval,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn run_poll_loop(
    engine: Arc<ReconcileEngine>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut pass = 0_u64;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                pass = pass.saturating_add(1);
                match engine.reconcile_all().await {
                    Ok(changes) if changes.is_empty() => {
                        tracing::debug!(pass, "tracker poll pass found nothing to complete");
                    }
                    Ok(changes) => {
                        tracing::info!(pass, completed = changes.len(), "tracker poll pass updated ledger");
                    }
                    Err(error) => {
                        tracing::warn!(pass, %error, "tracker poll pass failed");
                    }
                }
            }
            _ = &mut shutdown_rx => {
                tracing::info!(passes = pass, "tracker poll scheduler stopped");
                break;
            }
        }
    }
}
