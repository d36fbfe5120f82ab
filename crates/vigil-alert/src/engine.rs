use crate::config::AlertingConfig;
use crate::dispatch::{DispatchCounts, Dispatcher, Escalator, Notifier, Suppressor};
use crate::error::{AlertError, Result};
use crate::lifecycle::LifecycleManager;
use crate::registry::RuleRegistry;
use crate::scheduler::EvaluationScheduler;
use crate::store::{AlertFilter, AlertStore};
use crate::sweeper::RetentionSweeper;
use crate::{Evaluation, MetricEvaluator};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use vigil_common::types::{ActiveAlert, AlertRule};

/// Point-in-time counters for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub total_alerts: usize,
    pub by_state: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub evaluation_errors: u64,
    pub skipped_evaluations: u64,
    pub dispatched: DispatchCounts,
}

/// Entry point tying the registries, scheduler, lifecycle and sweeper
/// together.
pub struct AlertEngine {
    config: AlertingConfig,
    rules: Arc<RuleRegistry>,
    alerts: Arc<AlertStore>,
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Arc<Dispatcher>,
    evaluator: Arc<dyn MetricEvaluator>,
    scheduler: Arc<EvaluationScheduler>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub struct AlertEngineBuilder {
    config: AlertingConfig,
    evaluator: Arc<dyn MetricEvaluator>,
    alerts: Option<Arc<AlertStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    escalator: Option<Arc<dyn Escalator>>,
    suppressor: Option<Arc<dyn Suppressor>>,
    escalation_policies: HashSet<String>,
}

impl AlertEngineBuilder {
    /// Shares an alert store with collaborators that need to observe alert
    /// state, such as the escalation manager.
    pub fn alert_store(mut self, alerts: Arc<AlertStore>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn escalator(mut self, escalator: Arc<dyn Escalator>) -> Self {
        self.escalator = Some(escalator);
        self
    }

    pub fn suppressor(mut self, suppressor: Arc<dyn Suppressor>) -> Self {
        self.suppressor = Some(suppressor);
        self
    }

    /// IDs that rules may reference in `escalation_policy`.
    pub fn escalation_policies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.escalation_policies = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> AlertEngine {
        let rules = Arc::new(RuleRegistry::new(
            self.config.metric_thresholds.clone(),
            self.escalation_policies,
        ));
        let alerts = self.alerts.unwrap_or_default();
        let dispatcher = Arc::new(Dispatcher::new(self.notifier, self.escalator));
        let lifecycle = Arc::new(LifecycleManager::new(
            rules.clone(),
            alerts.clone(),
            self.suppressor,
            dispatcher.clone(),
        ));
        let scheduler = Arc::new(EvaluationScheduler::new(
            rules.clone(),
            lifecycle.clone(),
            self.evaluator.clone(),
            self.config.max_concurrent_evaluations,
            self.config.evaluation_interval(),
        ));
        let (shutdown, _) = broadcast::channel(1);

        AlertEngine {
            config: self.config,
            rules,
            alerts,
            lifecycle,
            dispatcher,
            evaluator: self.evaluator,
            scheduler,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

impl AlertEngine {
    pub fn builder(config: AlertingConfig, evaluator: Arc<dyn MetricEvaluator>) -> AlertEngineBuilder {
        AlertEngineBuilder {
            config,
            evaluator,
            alerts: None,
            notifier: None,
            escalator: None,
            suppressor: None,
            escalation_policies: HashSet::new(),
        }
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    pub fn alert_store(&self) -> &Arc<AlertStore> {
        &self.alerts
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &Arc<EvaluationScheduler> {
        &self.scheduler
    }

    /// Spawns the evaluation loop and the retention sweeper. Does nothing
    /// when alerting is disabled or the loops are already running.
    pub fn start(&self) {
        if !self.config.enabled {
            tracing::info!("Alerting disabled, engine not started");
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.push(tokio::spawn(
            self.scheduler.clone().run(self.shutdown.subscribe()),
        ));
        let sweeper = RetentionSweeper::new(
            self.alerts.clone(),
            self.config.alert_retention(),
            self.config.sweep_interval(),
        );
        tasks.push(tokio::spawn(sweeper.run(self.shutdown.subscribe())));

        tracing::info!(
            rules = self.rules.len(),
            interval_secs = self.config.evaluation_interval_secs,
            max_concurrent = self.config.max_concurrent_evaluations,
            "Alert engine started"
        );
    }

    /// Signals both loops and waits until in-flight evaluations finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Alert engine task failed");
            }
        }
        tracing::info!("Alert engine stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    pub fn add_rule(&self, rule: AlertRule) -> Result<String> {
        self.rules.add_rule(rule)
    }

    pub fn update_rule(&self, id: &str, rule: AlertRule) -> Result<AlertRule> {
        self.rules.update_rule(id, rule)
    }

    /// Removes the rule and every alert it produced.
    pub fn remove_rule(&self, id: &str) -> Result<AlertRule> {
        let rule = self.rules.remove_rule(id)?;
        let purged = self.alerts.remove_for_rule(id);
        if purged > 0 {
            tracing::info!(rule_id = %id, purged, "Purged alerts of removed rule");
        }
        Ok(rule)
    }

    pub fn get_rule(&self, id: &str) -> Option<AlertRule> {
        self.rules.get_rule(id)
    }

    pub fn list_rules(&self) -> Vec<AlertRule> {
        self.rules.list_rules()
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.rules.set_enabled(id, enabled)?;
        tracing::info!(rule_id = %id, enabled, "Alert rule toggled");
        Ok(())
    }

    pub fn list_active_alerts(&self, filter: &AlertFilter) -> Vec<ActiveAlert> {
        self.alerts.list(filter)
    }

    pub fn get_alert(&self, fingerprint: &str) -> Option<ActiveAlert> {
        self.alerts.get(fingerprint)
    }

    pub fn acknowledge(&self, fingerprint: &str, user: &str) -> Result<ActiveAlert> {
        self.lifecycle.acknowledge(fingerprint, user)
    }

    pub fn resolve(&self, fingerprint: &str, user: &str) -> Result<ActiveAlert> {
        self.lifecycle.resolve(fingerprint, user)
    }

    /// Runs the evaluator for one rule without touching alert state.
    pub async fn test_rule(&self, id: &str) -> Result<Evaluation> {
        let rule = self
            .rules
            .get_rule(id)
            .ok_or_else(|| AlertError::RuleNotFound(id.to_string()))?;
        self.evaluator
            .evaluate(&rule)
            .await
            .map_err(|e| AlertError::Evaluation(e.to_string()))
    }

    /// Runs a single evaluation pass and waits for it to complete.
    pub async fn evaluate_once(&self) -> usize {
        let mut tasks = JoinSet::new();
        let spawned = self.scheduler.tick(&mut tasks);
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "Evaluation task failed");
            }
        }
        spawned
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_rules: self.rules.len(),
            enabled_rules: self.rules.enabled_count(),
            total_alerts: self.alerts.len(),
            by_state: self.alerts.count_by_state(),
            by_severity: self.alerts.count_by_severity(),
            evaluation_errors: self.scheduler.evaluation_errors(),
            skipped_evaluations: self.scheduler.skipped_evaluations(),
            dispatched: self.dispatcher.stats(),
        }
    }
}
