use crate::store::AlertStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Purges resolved alerts once they are older than the retention period.
pub struct RetentionSweeper {
    alerts: Arc<AlertStore>,
    retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(alerts: Arc<AlertStore>, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            alerts,
            retention,
            interval,
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let removed = self.alerts.purge_resolved_before(cutoff);
        if removed > 0 {
            tracing::info!(removed, "Purged expired resolved alerts");
        }
        removed
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing can be expired at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Retention sweeper stopped");
                    break;
                }
            }
        }
    }
}
