use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::coordinator::{RefreshCoordinator, SweepOutcome};

/// Stops the periodic refresh task when asked.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the task and waits for it. A sweep in flight runs to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Refresh scheduler task failed: {}", e);
        }
    }
}

/// Ticks right away, then every `interval` plus up to `jitter`. Each tick goes
/// through the refresh gate, so restarts do not cause extra upstream load.
pub fn spawn_scheduler(
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    jitter: Duration,
) -> SchedulerHandle {
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        loop {
            tick(&coordinator).await;

            let delay = interval + random_jitter(jitter);
            tracing::debug!("Next refresh check in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => break,
            }
        }
        tracing::info!("Refresh scheduler stopped");
    });

    SchedulerHandle { shutdown, task }
}

async fn tick(coordinator: &RefreshCoordinator) {
    match coordinator.sweep(false).await {
        Ok(SweepOutcome::Completed(_)) => {}
        Ok(SweepOutcome::NotDue) => tracing::debug!("Scheduled refresh skipped, not due"),
        Ok(SweepOutcome::AlreadyRunning) => tracing::debug!("Scheduled refresh skipped, sweep running"),
        Err(e) => tracing::error!("Scheduled refresh failed: {}", e),
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(fastrand::u64(0..=max_ms))
}
