use crate::error::{AlertError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use vigil_common::types::{AlertRule, MAX_DURATION_SECS};

/// Thread-safe owner of all rule definitions.
///
/// Rules are validated on the way in; a rule that fails validation never
/// enters the registry. Reads hand out clones so callers never observe a
/// rule mid-update.
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, AlertRule>>,
    metric_thresholds: HashMap<String, f64>,
    escalation_policies: HashSet<String>,
}

impl RuleRegistry {
    pub fn new(
        metric_thresholds: HashMap<String, f64>,
        escalation_policies: HashSet<String>,
    ) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            metric_thresholds,
            escalation_policies,
        }
    }

    /// Validates and registers a rule, returning its ID.
    ///
    /// An empty `id` is replaced by a generated one. Conditions without a
    /// threshold receive the configured default for their metric.
    pub fn add_rule(&self, mut rule: AlertRule) -> Result<String> {
        self.validate(&mut rule)?;
        if rule.id.is_empty() {
            rule.id = vigil_common::id::prefixed_id("rule");
        }

        let now = Utc::now();
        rule.created_at = now;
        rule.updated_at = now;
        rule.last_evaluated = None;
        rule.evaluation_count = 0;
        rule.trigger_count = 0;

        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(AlertError::DuplicateRule(rule.id));
        }
        let id = rule.id.clone();
        tracing::info!(rule_id = %id, name = %rule.name, "Alert rule added");
        rules.insert(id.clone(), rule);
        Ok(id)
    }

    /// Replaces a rule's definition. `id`, `created_at` and the evaluation
    /// counters survive; label changes only affect future fingerprints.
    pub fn update_rule(&self, id: &str, mut rule: AlertRule) -> Result<AlertRule> {
        self.validate(&mut rule)?;

        let mut rules = self.rules.write();
        let existing = rules
            .get_mut(id)
            .ok_or_else(|| AlertError::RuleNotFound(id.to_string()))?;

        rule.id = existing.id.clone();
        rule.created_at = existing.created_at;
        rule.updated_at = Utc::now();
        rule.last_evaluated = existing.last_evaluated;
        rule.evaluation_count = existing.evaluation_count;
        rule.trigger_count = existing.trigger_count;
        *existing = rule;

        tracing::info!(rule_id = %id, "Alert rule updated");
        Ok(existing.clone())
    }

    pub fn remove_rule(&self, id: &str) -> Result<AlertRule> {
        let removed = self
            .rules
            .write()
            .remove(id)
            .ok_or_else(|| AlertError::RuleNotFound(id.to_string()))?;
        tracing::info!(rule_id = %id, "Alert rule removed");
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| AlertError::RuleNotFound(id.to_string()))?;
        rule.enabled = enabled;
        rule.updated_at = Utc::now();
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Option<AlertRule> {
        self.rules.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.read().contains_key(id)
    }

    /// Snapshot of every rule, oldest first.
    pub fn list_rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rules
    }

    pub fn enabled_rules(&self) -> Vec<AlertRule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.read().values().filter(|r| r.enabled).count()
    }

    /// No-op for rules removed while their evaluation was in flight.
    pub fn record_evaluation(&self, id: &str, at: DateTime<Utc>) {
        if let Some(rule) = self.rules.write().get_mut(id) {
            rule.last_evaluated = Some(at);
            rule.evaluation_count += 1;
        }
    }

    pub fn record_trigger(&self, id: &str) {
        if let Some(rule) = self.rules.write().get_mut(id) {
            rule.trigger_count += 1;
        }
    }

    fn validate(&self, rule: &mut AlertRule) -> Result<()> {
        if rule.name.trim().is_empty() {
            return Err(AlertError::InvalidRule("name must not be empty".into()));
        }
        if rule.for_secs > MAX_DURATION_SECS {
            return Err(AlertError::InvalidRule(format!(
                "rule '{}' has a for duration of {}s, above the {}s limit",
                rule.name, rule.for_secs, MAX_DURATION_SECS
            )));
        }
        if rule.conditions.is_empty() && rule.queries.is_empty() {
            return Err(AlertError::InvalidRule(format!(
                "rule '{}' needs at least one condition or metric query",
                rule.name
            )));
        }
        for query in &rule.queries {
            if query.query.trim().is_empty() {
                return Err(AlertError::InvalidRule(format!(
                    "metric query '{}' has an empty expression",
                    query.name
                )));
            }
        }
        for condition in &mut rule.conditions {
            if condition.metric.trim().is_empty() {
                return Err(AlertError::InvalidRule(
                    "condition metric must not be empty".into(),
                ));
            }
            if condition.window_secs == 0 {
                return Err(AlertError::InvalidRule(format!(
                    "condition on '{}' needs a non-zero window",
                    condition.metric
                )));
            }
            if condition.window_secs > MAX_DURATION_SECS {
                return Err(AlertError::InvalidRule(format!(
                    "condition on '{}' has a {}s window, above the {}s limit",
                    condition.metric, condition.window_secs, MAX_DURATION_SECS
                )));
            }
            if condition.threshold.is_none() {
                let default = self.metric_thresholds.get(&condition.metric).ok_or_else(|| {
                    AlertError::InvalidRule(format!(
                        "condition on '{}' has no threshold and no default is configured",
                        condition.metric
                    ))
                })?;
                condition.threshold = Some(*default);
            }
        }
        if let Some(policy) = &rule.escalation_policy {
            if !self.escalation_policies.contains(policy) {
                return Err(AlertError::UnknownEscalationPolicy(policy.clone()));
            }
        }
        Ok(())
    }
}
