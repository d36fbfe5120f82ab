use crate::error::{AlertError, Result};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use vigil_common::types::{ActiveAlert, AlertState, EventType, Severity};

/// Filter for [`AlertStore::list`]. `source` matches a rule ID or rule name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub state: Option<AlertState>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub source: Option<String>,
}

impl AlertFilter {
    fn matches(&self, alert: &ActiveAlert) -> bool {
        self.state.map_or(true, |s| alert.state == s)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self
                .source
                .as_deref()
                .map_or(true, |s| alert.rule_id == s || alert.rule_name == s)
    }
}

/// Live alert registry keyed by fingerprint.
///
/// Holds at most one entry per fingerprint. Every mutation goes through the
/// single write lock; listing copies entries out so callers never iterate a
/// map that is being changed.
#[derive(Default)]
pub struct AlertStore {
    alerts: RwLock<HashMap<String, ActiveAlert>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ActiveAlert>> {
        self.alerts.write()
    }

    pub fn get(&self, fingerprint: &str) -> Option<ActiveAlert> {
        self.alerts.read().get(fingerprint).cloned()
    }

    /// Snapshot of matching alerts, most recently started first.
    pub fn list(&self, filter: &AlertFilter) -> Vec<ActiveAlert> {
        let mut alerts: Vec<ActiveAlert> = self
            .alerts
            .read()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.starts_at
                .cmp(&a.starts_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    pub fn count_for_rule(&self, rule_id: &str) -> usize {
        self.alerts
            .read()
            .values()
            .filter(|a| a.rule_id == rule_id)
            .count()
    }

    /// Drops every alert produced by `rule_id`, whatever its state.
    pub fn remove_for_rule(&self, rule_id: &str) -> usize {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|_, a| a.rule_id != rule_id);
        before - alerts.len()
    }

    /// Removes resolved alerts whose `ends_at` is older than `cutoff`.
    /// Pending, firing and suppressed alerts are never removed.
    pub fn purge_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|_, a| {
            !(a.state == AlertState::Resolved && a.ends_at.is_some_and(|ends| ends < cutoff))
        });
        before - alerts.len()
    }

    /// Records an operator acknowledgement. The alert state is unchanged.
    pub fn acknowledge(
        &self,
        fingerprint: &str,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<ActiveAlert> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(fingerprint)
            .ok_or_else(|| AlertError::AlertNotFound(fingerprint.to_string()))?;
        alert.acknowledged_by = Some(user.to_string());
        alert.acknowledged_at = Some(now);
        alert.record(
            now,
            EventType::Acknowledged,
            format!("Alert acknowledged by {user}"),
            None,
            Some(user),
        );
        Ok(alert.clone())
    }

    /// Forces an alert into `Resolved` regardless of its condition.
    ///
    /// Returns the updated alert and whether the edge should be dispatched:
    /// only pending or firing alerts announce their resolution. Resolving an
    /// already resolved alert changes nothing.
    pub fn resolve(
        &self,
        fingerprint: &str,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<(ActiveAlert, bool)> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(fingerprint)
            .ok_or_else(|| AlertError::AlertNotFound(fingerprint.to_string()))?;
        if alert.state == AlertState::Resolved {
            return Ok((alert.clone(), false));
        }
        let announce = matches!(alert.state, AlertState::Pending | AlertState::Firing);
        alert.state = AlertState::Resolved;
        alert.ends_at = Some(now);
        alert.resolved_by = Some(user.to_string());
        alert.inhibited = false;
        alert.inhibited_by.clear();
        alert.record(
            now,
            EventType::Resolved,
            format!("Alert manually resolved by {user}"),
            None,
            Some(user),
        );
        Ok((alert.clone(), announce))
    }

    /// Appends an `Escalated` event and counts it as a notification.
    /// Returns `false` when the alert no longer exists.
    pub fn record_escalation(
        &self,
        fingerprint: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut alerts = self.alerts.write();
        let Some(alert) = alerts.get_mut(fingerprint) else {
            return false;
        };
        alert.record(now, EventType::Escalated, description, None, None);
        alert.last_notified = Some(now);
        alert.notification_count += 1;
        true
    }

    pub fn count_by_state(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for alert in self.alerts.read().values() {
            *counts.entry(alert.state.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_by_severity(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for alert in self.alerts.read().values() {
            *counts.entry(alert.severity.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
