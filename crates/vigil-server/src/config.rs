use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_alert::config::AlertingConfig;
use vigil_common::types::{AlertCondition, AlertRule, Labels, MetricQuery, Severity};
use vigil_notify::escalation::EscalationPolicy;
use vigil_notify::manager::ChannelConfig;
use vigil_notify::suppression::SuppressionRule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// JSON file of rules registered at startup.
    #[serde(default)]
    pub rules_file: Option<String>,
    /// Retention of ingested metric samples, per series.
    #[serde(default = "default_metric_retention_secs")]
    pub metric_retention_secs: u64,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub escalation_policies: Vec<EscalationPolicy>,
    #[serde(default)]
    pub suppression_rules: Vec<SuppressionRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            rules_file: None,
            metric_retention_secs: default_metric_retention_secs(),
            alerting: AlertingConfig::default(),
            channels: Vec::new(),
            escalation_policies: Vec::new(),
            suppression_rules: Vec::new(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_metric_retention_secs() -> u64 {
    3600
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
        Ok(config)
    }
}

// ---- Rules seed file (startup `rules_file` and the `check-rules` subcommand) ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesSeedFile {
    #[serde(default)]
    pub rules: Vec<RuleRequest>,
}

impl RulesSeedFile {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read rules file '{}': {}", path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse rules file '{}': {}", path, e))
    }
}

/// A rule as submitted by a client. Unlike [`AlertRule`] the severity is
/// optional and runtime bookkeeping is not accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRequest {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub for_secs: u64,
    #[serde(default)]
    pub conditions: Vec<AlertCondition>,
    #[serde(default)]
    pub queries: Vec<MetricQuery>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub notification_group: Option<String>,
    #[serde(default)]
    pub escalation_policy: Option<String>,
}

fn default_true() -> bool {
    true
}

impl RuleRequest {
    pub fn into_rule(self, default_severity: Severity) -> AlertRule {
        let mut rule = AlertRule::new(self.name, self.severity.unwrap_or(default_severity));
        rule.id = self.id;
        rule.description = self.description;
        rule.enabled = self.enabled;
        rule.for_secs = self.for_secs;
        rule.conditions = self.conditions;
        rule.queries = self.queries;
        rule.labels = self.labels;
        rule.annotations = self.annotations;
        rule.notification_group = self.notification_group;
        rule.escalation_policy = self.escalation_policy;
        rule
    }
}

/// Body of `POST /v1/silences`.
#[derive(Debug, Clone, Deserialize)]
pub struct SilenceRequest {
    #[serde(default)]
    pub name: String,
    pub matchers: Vec<vigil_common::matcher::LabelMatcher>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub comment: String,
}

impl SilenceRequest {
    /// A silence without `starts_at` takes effect immediately.
    pub fn into_rule(self, now: DateTime<Utc>) -> SuppressionRule {
        SuppressionRule {
            id: String::new(),
            name: self.name,
            matchers: self.matchers,
            starts_at: self.starts_at.unwrap_or(now),
            ends_at: self.ends_at,
            enabled: true,
            created_by: self.created_by,
            comment: self.comment,
        }
    }
}
