use crate::error::{NotifyError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vigil_alert::dispatch::Suppressor;
use vigil_common::matcher::{matches_all, LabelMatcher};
use vigil_common::types::Labels;

fn default_true() -> bool {
    true
}

/// A silence: alerts whose labels match every matcher between `starts_at`
/// and `ends_at` are tracked but not dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub matchers: Vec<LabelMatcher>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub comment: String,
}

impl SuppressionRule {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.starts_at <= now && now < self.ends_at
    }

    pub fn matches(&self, labels: &Labels, now: DateTime<Utc>) -> bool {
        self.is_active(now) && matches_all(&self.matchers, labels)
    }
}

/// Runtime-editable set of silences.
#[derive(Default)]
pub struct SuppressionManager {
    rules: RwLock<HashMap<String, SuppressionRule>>,
}

impl SuppressionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a silence, generating an ID when none is given.
    /// An existing silence with the same ID is replaced.
    pub fn add(&self, mut rule: SuppressionRule) -> Result<SuppressionRule> {
        if rule.matchers.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "silence needs at least one matcher".into(),
            ));
        }
        if rule.ends_at <= rule.starts_at {
            return Err(NotifyError::InvalidConfig(
                "silence ends_at must be after starts_at".into(),
            ));
        }
        for matcher in &mut rule.matchers {
            matcher.compile().map_err(|e| {
                NotifyError::InvalidConfig(format!("invalid matcher '{}': {e}", matcher.name))
            })?;
        }
        if rule.id.is_empty() {
            rule.id = vigil_common::id::prefixed_id("silence");
        }

        tracing::info!(
            silence_id = %rule.id,
            created_by = %rule.created_by,
            ends_at = %rule.ends_at,
            "Silence added"
        );
        self.rules.write().insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    pub fn remove(&self, id: &str) -> Result<SuppressionRule> {
        let removed = self
            .rules
            .write()
            .remove(id)
            .ok_or_else(|| NotifyError::SilenceNotFound(id.to_string()))?;
        tracing::info!(silence_id = %id, "Silence removed");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<SuppressionRule> {
        self.rules.read().get(id).cloned()
    }

    /// Snapshot of all silences ordered by start time.
    pub fn list(&self) -> Vec<SuppressionRule> {
        let mut rules: Vec<SuppressionRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
        rules
    }

    /// Drops silences that ended before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|_, r| r.ends_at > now);
        before - rules.len()
    }
}

impl Suppressor for SuppressionManager {
    fn matching(&self, labels: &Labels, now: DateTime<Utc>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .rules
            .read()
            .values()
            .filter(|r| r.matches(labels, now))
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
