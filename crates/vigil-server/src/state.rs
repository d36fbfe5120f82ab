use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_alert::engine::AlertEngine;
use vigil_alert::rules::ThresholdEvaluator;
use vigil_alert::store::AlertStore;
use vigil_alert::window::MetricStore;
use vigil_notify::escalation::EscalationManager;
use vigil_notify::manager::NotificationManager;
use vigil_notify::plugin::ChannelRegistry;
use vigil_notify::suppression::SuppressionManager;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub metrics: Arc<MetricStore>,
    pub silences: Arc<SuppressionManager>,
    pub notifications: Arc<NotificationManager>,
    pub escalation: Arc<EscalationManager>,
    pub config: Arc<ServerConfig>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    /// Wires the metric store, notification stack and alert engine from
    /// configuration. Nothing is started; see [`AlertEngine::start`].
    pub fn build(config: ServerConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricStore::new(config.metric_retention_secs));
        let evaluator = Arc::new(ThresholdEvaluator::new(metrics.clone()));

        let registry = ChannelRegistry::default();
        let notifications = Arc::new(NotificationManager::from_configs(
            &registry,
            config.channels.clone(),
        )?);

        let alerts = Arc::new(AlertStore::new());
        let escalation = Arc::new(EscalationManager::new(
            config.escalation_policies.clone(),
            alerts.clone(),
            notifications.clone(),
        )?);

        let silences = Arc::new(SuppressionManager::new());
        for rule in config.suppression_rules.clone() {
            silences.add(rule)?;
        }

        let engine = AlertEngine::builder(config.alerting.clone(), evaluator)
            .alert_store(alerts)
            .notifier(notifications.clone())
            .escalator(escalation.clone())
            .suppressor(silences.clone())
            .escalation_policies(escalation.policy_ids())
            .build();

        tracing::info!(
            channels = notifications.channel_ids().len(),
            escalation_policies = config.escalation_policies.len(),
            silences = config.suppression_rules.len(),
            "Alerting services initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            metrics,
            silences,
            notifications,
            escalation,
            config: Arc::new(config),
            start_time: Utc::now(),
        })
    }
}
