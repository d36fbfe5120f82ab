use crate::error::{NotifyError, Result};
use crate::manager::NotificationManager;
use crate::NotificationKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use vigil_alert::dispatch::Escalator;
use vigil_alert::store::AlertStore;
use vigil_common::types::{ActiveAlert, AlertState};

/// User recorded on alerts closed by an `auto_resolve` step.
pub const ESCALATION_USER: &str = "escalation";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub order: u32,
    /// Delay before the step's first notification.
    #[serde(default)]
    pub wait_secs: u64,
    pub channels: Vec<String>,
    /// Resolve the alert once this step has used up its repeats.
    #[serde(default)]
    pub auto_resolve: bool,
    #[serde(default)]
    pub repeat_interval_secs: u64,
    #[serde(default)]
    pub max_repeats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub steps: Vec<EscalationStep>,
}

struct Running {
    starts_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Runs escalation policies for firing alerts.
///
/// Each firing edge starts one workflow task per alert. The workflow walks
/// the policy's steps in `order` and re-reads the alert before every
/// notification; it stops on its own as soon as the alert is resolved,
/// acknowledged or has been reopened as a new instance. A newer firing edge
/// for the same fingerprint replaces the running workflow.
pub struct EscalationManager {
    policies: HashMap<String, Arc<EscalationPolicy>>,
    alerts: Arc<AlertStore>,
    notifications: Arc<NotificationManager>,
    running: Arc<Mutex<HashMap<String, Running>>>,
}

impl EscalationManager {
    /// Validates the policies against the configured channels.
    pub fn new(
        policies: Vec<EscalationPolicy>,
        alerts: Arc<AlertStore>,
        notifications: Arc<NotificationManager>,
    ) -> Result<Self> {
        let mut by_id = HashMap::new();
        for mut policy in policies {
            if policy.steps.is_empty() {
                return Err(NotifyError::InvalidConfig(format!(
                    "escalation policy '{}' has no steps",
                    policy.id
                )));
            }
            for step in &policy.steps {
                if let Some(unknown) = step
                    .channels
                    .iter()
                    .find(|c| !notifications.has_channel(c))
                {
                    return Err(NotifyError::InvalidConfig(format!(
                        "escalation policy '{}' step {} references unknown channel '{unknown}'",
                        policy.id, step.order
                    )));
                }
            }
            policy.steps.sort_by_key(|s| s.order);
            let id = policy.id.clone();
            if by_id.insert(id.clone(), Arc::new(policy)).is_some() {
                return Err(NotifyError::InvalidConfig(format!(
                    "duplicate escalation policy '{id}'"
                )));
            }
        }

        Ok(Self {
            policies: by_id,
            alerts,
            notifications,
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn policy_ids(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    /// Workflows still in progress.
    pub fn active_count(&self) -> usize {
        let mut running = self.running.lock();
        running.retain(|_, r| !r.handle.is_finished());
        running.len()
    }

    /// Aborts every running workflow.
    pub fn shutdown(&self) {
        for (_, running) in self.running.lock().drain() {
            running.handle.abort();
        }
    }
}

#[async_trait]
impl Escalator for EscalationManager {
    async fn start_escalation(&self, alert: ActiveAlert) -> anyhow::Result<()> {
        let Some(policy_id) = alert.escalation_policy.as_deref() else {
            return Ok(());
        };
        let policy = self
            .policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown escalation policy '{policy_id}'"))?;
        if !policy.enabled {
            tracing::debug!(policy = %policy.id, "Escalation policy disabled");
            return Ok(());
        }

        let fingerprint = alert.fingerprint.clone();
        let starts_at = alert.starts_at;
        let workflow = Workflow {
            policy,
            fingerprint: fingerprint.clone(),
            starts_at,
            alerts: self.alerts.clone(),
            notifications: self.notifications.clone(),
        };
        let running = self.running.clone();

        let mut guard = self.running.lock();
        let handle = tokio::spawn(async move {
            workflow.run().await;
            let mut running = running.lock();
            if running
                .get(&workflow.fingerprint)
                .is_some_and(|r| r.starts_at == workflow.starts_at)
            {
                running.remove(&workflow.fingerprint);
            }
        });
        if let Some(previous) = guard.insert(fingerprint, Running { starts_at, handle }) {
            previous.handle.abort();
        }
        Ok(())
    }
}

struct Workflow {
    policy: Arc<EscalationPolicy>,
    fingerprint: String,
    starts_at: DateTime<Utc>,
    alerts: Arc<AlertStore>,
    notifications: Arc<NotificationManager>,
}

impl Workflow {
    /// The alert, if this escalation should still act on it.
    fn current(&self) -> Option<ActiveAlert> {
        self.alerts.get(&self.fingerprint).filter(|a| {
            a.state == AlertState::Firing && !a.is_acknowledged() && a.starts_at == self.starts_at
        })
    }

    async fn run(&self) {
        tracing::info!(policy = %self.policy.id, fingerprint = %self.fingerprint, "Escalation started");
        for step in &self.policy.steps {
            tokio::time::sleep(Duration::from_secs(step.wait_secs)).await;

            for round in 0..=step.max_repeats {
                if round > 0 {
                    tokio::time::sleep(Duration::from_secs(step.repeat_interval_secs)).await;
                }
                let Some(alert) = self.current() else {
                    tracing::info!(
                        policy = %self.policy.id,
                        fingerprint = %self.fingerprint,
                        step = step.order,
                        "Escalation stopped, alert no longer firing or acknowledged"
                    );
                    return;
                };

                if let Err(e) = self
                    .notifications
                    .send_to(&step.channels, &alert, NotificationKind::Escalation)
                    .await
                {
                    tracing::warn!(fingerprint = %self.fingerprint, step = step.order, error = %e, "Escalation notification failed");
                }
                let description = format!(
                    "Escalation step {} notified {}",
                    step.order,
                    step.channels.join(", ")
                );
                self.alerts
                    .record_escalation(&self.fingerprint, &description, Utc::now());
            }

            if step.auto_resolve {
                self.auto_resolve().await;
                return;
            }
        }
        tracing::debug!(policy = %self.policy.id, fingerprint = %self.fingerprint, "Escalation finished");
    }

    async fn auto_resolve(&self) {
        match self
            .alerts
            .resolve(&self.fingerprint, ESCALATION_USER, Utc::now())
        {
            Ok((alert, true)) => {
                tracing::info!(fingerprint = %self.fingerprint, "Alert auto-resolved by escalation");
                if let Err(e) = self
                    .notifications
                    .notify(&alert, NotificationKind::Resolved)
                    .await
                {
                    tracing::warn!(fingerprint = %self.fingerprint, error = %e, "Resolution notification failed");
                }
            }
            Ok((_, false)) => {}
            Err(e) => {
                tracing::debug!(fingerprint = %self.fingerprint, error = %e, "Alert gone before auto-resolve");
            }
        }
    }
}
