use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vigil_common::types::{ActiveAlert, Labels};

/// Receives firing and resolved edges.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_firing(&self, alert: &ActiveAlert) -> Result<()>;
    async fn notify_resolved(&self, alert: &ActiveAlert) -> Result<()>;
}

/// Starts an escalation sequence for a newly firing alert.
#[async_trait]
pub trait Escalator: Send + Sync {
    async fn start_escalation(&self, alert: ActiveAlert) -> Result<()>;
}

/// Answers whether an alert's labels are silenced right now.
///
/// Called on the evaluation path, so implementations must not block.
pub trait Suppressor: Send + Sync {
    /// IDs of every active suppression rule matching `labels` at `now`.
    fn matching(&self, labels: &Labels, now: DateTime<Utc>) -> Vec<String>;
}

/// A state edge produced by the lifecycle manager.
#[derive(Debug, Clone)]
pub enum Transition {
    Firing(ActiveAlert),
    Resolved(ActiveAlert),
}

impl Transition {
    pub fn alert(&self) -> &ActiveAlert {
        match self {
            Transition::Firing(a) | Transition::Resolved(a) => a,
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    firing: AtomicU64,
    resolved: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub firing: u64,
    pub resolved: u64,
    pub failures: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            firing: self.firing.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Hands transitions to the notifier and escalator on detached tasks so that
/// a slow channel never holds up evaluation. Failures are logged and counted,
/// never propagated back into alert state.
pub struct Dispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    escalator: Option<Arc<dyn Escalator>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, escalator: Option<Arc<dyn Escalator>>) -> Self {
        Self {
            notifier,
            escalator,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    pub fn dispatch(&self, transition: Transition) {
        match &transition {
            Transition::Firing(_) => self.stats.firing.fetch_add(1, Ordering::Relaxed),
            Transition::Resolved(_) => self.stats.resolved.fetch_add(1, Ordering::Relaxed),
        };

        if self.notifier.is_none() && self.escalator.is_none() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                fingerprint = %transition.alert().fingerprint,
                "No runtime available, dropping alert dispatch"
            );
            return;
        };

        if let Some(notifier) = self.notifier.clone() {
            let stats = self.stats.clone();
            let transition = transition.clone();
            handle.spawn(async move {
                let (kind, result) = match &transition {
                    Transition::Firing(alert) => ("firing", notifier.notify_firing(alert).await),
                    Transition::Resolved(alert) => {
                        ("resolved", notifier.notify_resolved(alert).await)
                    }
                };
                if let Err(e) = result {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        fingerprint = %transition.alert().fingerprint,
                        kind,
                        error = %e,
                        "Alert notification failed"
                    );
                }
            });
        }

        if let (Transition::Firing(alert), Some(escalator)) = (transition, self.escalator.clone())
        {
            if alert.escalation_policy.is_none() {
                return;
            }
            let stats = self.stats.clone();
            handle.spawn(async move {
                let fingerprint = alert.fingerprint.clone();
                if let Err(e) = escalator.start_escalation(alert).await {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(fingerprint = %fingerprint, error = %e, "Escalation failed to start");
                }
            });
        }
    }
}
