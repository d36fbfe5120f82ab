use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label set attached to rules and alerts.
///
/// A `BTreeMap` keeps iteration order stable, so anything derived from a
/// label set (fingerprints, display strings) does not depend on insertion
/// order.
pub type Labels = BTreeMap<String, String>;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle state of an [`ActiveAlert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Condition observed true, not yet sustained for the rule's `for` duration.
    Pending,
    /// Condition sustained; notified and escalated.
    Firing,
    /// A suppression rule matches; state is tracked but nothing is dispatched.
    Suppressed,
    /// Condition cleared or resolved by an operator. Eligible for retention sweep.
    Resolved,
}

impl AlertState {
    /// Everything except `Resolved` counts as live.
    pub fn is_live(self) -> bool {
        !matches!(self, AlertState::Resolved)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Pending => write!(f, "pending"),
            AlertState::Firing => write!(f, "firing"),
            AlertState::Suppressed => write!(f, "suppressed"),
            AlertState::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AlertState::Pending),
            "firing" => Ok(AlertState::Firing),
            "suppressed" => Ok(AlertState::Suppressed),
            "resolved" => Ok(AlertState::Resolved),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Firing,
    Resolved,
    Suppressed,
    Acknowledged,
    Escalated,
}

/// One entry of an alert's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Comparison applied between an aggregated metric value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "gt", alias = "greater_than")]
    GreaterThan,
    #[serde(rename = "lt", alias = "less_than")]
    LessThan,
    #[serde(rename = "gte", alias = "greater_equal")]
    GreaterEqual,
    #[serde(rename = "lte", alias = "less_equal")]
    LessEqual,
    #[serde(rename = "eq", alias = "equal")]
    Equal,
    #[serde(rename = "neq", alias = "not_equal")]
    NotEqual,
}

impl std::str::FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | "gt" => Ok(Self::GreaterThan),
            "less_than" | "lt" => Ok(Self::LessThan),
            "greater_equal" | "gte" => Ok(Self::GreaterEqual),
            "less_equal" | "lte" => Ok(Self::LessEqual),
            "equal" | "eq" => Ok(Self::Equal),
            "not_equal" | "neq" => Ok(Self::NotEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, "gt"),
            Self::LessThan => write!(f, "lt"),
            Self::GreaterEqual => write!(f, "gte"),
            Self::LessEqual => write!(f, "lte"),
            Self::Equal => write!(f, "eq"),
            Self::NotEqual => write!(f, "neq"),
        }
    }
}

impl CompareOp {
    /// Equality uses an absolute epsilon of `1e-9`.
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < 1e-9,
            Self::NotEqual => (value - threshold).abs() >= 1e-9,
        }
    }
}

/// How samples inside a condition's window collapse into one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Sum,
    #[default]
    Last,
    Count,
}

impl Aggregation {
    /// Returns `None` for an empty slice, except `Count` which yields `0`.
    ///
    /// `Last` expects `values` in timestamp order.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if let Aggregation::Count = self {
            return Some(values.len() as f64);
        }
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregation::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregation::Min => values.iter().copied().reduce(f64::min),
            Aggregation::Max => values.iter().copied().reduce(f64::max),
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Last => values.last().copied(),
            Aggregation::Count => Some(values.len() as f64),
        }
    }
}

fn default_condition_window_secs() -> u64 {
    60
}

/// A single threshold check evaluated by the built-in evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub metric: String,
    pub operator: CompareOp,
    /// Falls back to the engine's `metric_thresholds[metric]` when absent.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default = "default_condition_window_secs")]
    pub window_secs: u64,
    /// Series filter: only samples carrying all of these labels count.
    #[serde(default)]
    pub labels: Labels,
}

/// An opaque query for evaluators backed by an external query language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub datasource: String,
    #[serde(default)]
    pub ref_id: String,
    #[serde(default)]
    pub labels: Labels,
}

fn default_true() -> bool {
    true
}

/// A user-authored evaluation unit.
///
/// `id` never changes once the rule is registered. `labels` participate in
/// alert identity, `annotations` do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Severity,
    /// Minimum continuous-true duration before Pending promotes to Firing.
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
    #[serde(default)]
    pub last_evaluated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluation_count: u64,
    #[serde(default)]
    pub trigger_count: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Builds an enabled rule with no conditions; mostly useful in tests and
    /// seed tooling where fields are filled in afterwards.
    pub fn new(name: impl Into<String>, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            severity,
            for_secs: 0,
            conditions: Vec::new(),
            queries: Vec::new(),
            labels: Labels::new(),
            annotations: Labels::new(),
            notification_group: None,
            escalation_policy: None,
            last_evaluated: None,
            evaluation_count: 0,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `None` when `for_secs` does not fit a `chrono::Duration`; such a rule
    /// never leaves Pending.
    pub fn for_duration(&self) -> Option<chrono::Duration> {
        seconds(self.for_secs)
    }
}

/// Upper bound for any configured duration (`for_secs`, windows, retention):
/// ten years.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Converts a seconds count to a `chrono::Duration`, `None` if it does not fit.
pub fn seconds(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// Like [`seconds`] but clamps to [`MAX_DURATION_SECS`].
pub fn capped_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

/// The live instance of a rule's condition being (or having recently been) true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlert {
    /// Deterministic identity derived from `(rule_id, labels)`.
    pub fingerprint: String,
    pub rule_id: String,
    pub rule_name: String,
    /// Copied at creation; later rule edits do not change it.
    pub severity: Severity,
    pub state: AlertState,
    pub labels: Labels,
    pub annotations: Labels,
    pub starts_at: DateTime<Utc>,
    /// Set only while `state == Resolved`.
    pub ends_at: Option<DateTime<Utc>>,
    pub last_notified: Option<DateTime<Utc>>,
    pub notification_count: u32,
    /// Most recently observed value.
    pub value: f64,
    pub inhibited: bool,
    /// IDs of the suppression rules currently silencing this alert.
    pub inhibited_by: Vec<String>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Operator who resolved the alert by hand, if any.
    pub resolved_by: Option<String>,
    pub notification_group: Option<String>,
    pub escalation_policy: Option<String>,
    pub history: Vec<AlertEvent>,
}

impl ActiveAlert {
    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        event_type: EventType,
        description: impl Into<String>,
        value: Option<f64>,
        user: Option<&str>,
    ) {
        self.history.push(AlertEvent {
            timestamp,
            event_type,
            description: description.into(),
            value,
            user: user.map(str::to_string),
        });
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

/// A single sample pushed into the metric store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: Labels,
}

/// Format labels into a human-readable string.
///
/// # Examples
///
/// ```
/// use vigil_common::types::{format_labels, Labels};
///
/// let mut labels = Labels::new();
/// labels.insert("mount".to_string(), "/data".to_string());
/// labels.insert("device".to_string(), "sda1".to_string());
/// assert_eq!(format_labels(&labels), "device=sda1, mount=/data");
/// ```
pub fn format_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_follows_scale() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn oversized_for_duration_is_none() {
        let mut rule = AlertRule::new("cpu", Severity::High);
        rule.for_secs = 300;
        assert_eq!(rule.for_duration(), Some(chrono::Duration::minutes(5)));

        rule.for_secs = 10_000_000_000_000_000;
        assert_eq!(rule.for_duration(), None);
        rule.for_secs = u64::MAX;
        assert_eq!(rule.for_duration(), None);
        assert!(seconds(MAX_DURATION_SECS).is_some());
        assert_eq!(capped_seconds(u64::MAX), chrono::Duration::days(3650));
        assert_eq!(capped_seconds(90), chrono::Duration::seconds(90));
    }

    #[test]
    fn compare_op_parses_short_and_long_forms() {
        assert_eq!("gt".parse::<CompareOp>().unwrap(), CompareOp::GreaterThan);
        assert_eq!(
            "less_equal".parse::<CompareOp>().unwrap(),
            CompareOp::LessEqual
        );
        assert!("between".parse::<CompareOp>().is_err());

        let op: CompareOp = serde_json::from_str("\"greater_equal\"").unwrap();
        assert_eq!(op, CompareOp::GreaterEqual);
        assert_eq!(serde_json::to_string(&op).unwrap(), "\"gte\"");
    }

    #[test]
    fn compare_op_checks() {
        assert!(CompareOp::GreaterThan.check(91.0, 90.0));
        assert!(!CompareOp::GreaterThan.check(90.0, 90.0));
        assert!(CompareOp::GreaterEqual.check(90.0, 90.0));
        assert!(CompareOp::Equal.check(0.1 + 0.2, 0.3));
        assert!(CompareOp::NotEqual.check(1.0, 2.0));
    }

    #[test]
    fn aggregation_of_empty_window() {
        assert_eq!(Aggregation::Avg.apply(&[]), None);
        assert_eq!(Aggregation::Count.apply(&[]), Some(0.0));
    }

    #[test]
    fn aggregation_values() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(Aggregation::Avg.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Min.apply(&values), Some(1.0));
        assert_eq!(Aggregation::Max.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Sum.apply(&values), Some(6.0));
        assert_eq!(Aggregation::Last.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Count.apply(&values), Some(3.0));
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: AlertRule = serde_json::from_str(
            r#"{
                "name": "cpu high",
                "conditions": [{ "metric": "cpu_usage", "operator": "gt" }]
            }"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.severity, Severity::Medium);
        assert_eq!(rule.for_secs, 0);
        assert_eq!(rule.conditions[0].window_secs, 60);
        assert_eq!(rule.conditions[0].aggregation, Aggregation::Last);
        assert!(rule.conditions[0].threshold.is_none());
    }

    #[test]
    fn alert_event_serializes_type_field() {
        let event = AlertEvent {
            timestamp: Utc::now(),
            event_type: EventType::Acknowledged,
            description: "ack".into(),
            value: None,
            user: Some("ops".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "acknowledged");
        assert_eq!(json["user"], "ops");
        assert!(json.get("value").is_none());
    }
}
