use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use vigil_common::types::{capped_seconds, Severity};

/// Engine settings, usually embedded as the `[alerting]` table of the
/// server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    /// How long a resolved alert stays visible before the sweeper drops it.
    #[serde(default = "default_alert_retention_secs")]
    pub alert_retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,
    #[serde(default)]
    pub default_severity: Severity,
    /// Fallback thresholds for conditions that omit one, keyed by metric name.
    #[serde(default = "default_metric_thresholds")]
    pub metric_thresholds: HashMap<String, f64>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            alert_retention_secs: default_alert_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_concurrent_evaluations: default_max_concurrent_evaluations(),
            default_severity: Severity::default(),
            metric_thresholds: default_metric_thresholds(),
        }
    }
}

impl AlertingConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Capped at ten years.
    pub fn alert_retention(&self) -> chrono::Duration {
        capped_seconds(self.alert_retention_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_alert_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_max_concurrent_evaluations() -> usize {
    10
}

fn default_metric_thresholds() -> HashMap<String, f64> {
    HashMap::from([
        ("cpu_usage".to_string(), 80.0),
        ("memory_usage".to_string(), 85.0),
        ("disk_usage".to_string(), 90.0),
        ("error_rate".to_string(), 5.0),
    ])
}
