use crate::dispatch::{Dispatcher, Suppressor, Transition};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::registry::RuleRegistry;
use crate::store::AlertStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_common::types::{ActiveAlert, AlertRule, AlertState, EventType};

/// Applies evaluation outcomes and operator actions to the alert store.
///
/// Every transition happens under the store's write lock; dispatch runs
/// after the lock is released.
pub struct LifecycleManager {
    rules: Arc<RuleRegistry>,
    alerts: Arc<AlertStore>,
    suppressor: Option<Arc<dyn Suppressor>>,
    dispatcher: Arc<Dispatcher>,
}

/// What a single `process` call did, mostly for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rule no longer registered or nothing to do.
    Unchanged,
    Created(AlertState),
    Promoted,
    Reopened(AlertState),
    Resolved,
    Suppressed,
    Unsuppressed,
    Updated,
}

impl LifecycleManager {
    pub fn new(
        rules: Arc<RuleRegistry>,
        alerts: Arc<AlertStore>,
        suppressor: Option<Arc<dyn Suppressor>>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            rules,
            alerts,
            suppressor,
            dispatcher,
        }
    }

    pub fn process(&self, rule: &AlertRule, should_fire: bool, value: f64) -> Outcome {
        self.process_at(rule, should_fire, value, Utc::now())
    }

    /// Runs one step of the state machine for the alert identified by
    /// `(rule.id, rule.labels)` as if the evaluation finished at `now`.
    pub fn process_at(
        &self,
        rule: &AlertRule,
        should_fire: bool,
        value: f64,
        now: DateTime<Utc>,
    ) -> Outcome {
        let fp = fingerprint(&rule.id, &rule.labels);
        let silences = self
            .suppressor
            .as_ref()
            .map(|s| s.matching(&rule.labels, now))
            .unwrap_or_default();

        let (outcome, transition) = {
            let mut alerts = self.alerts.write();
            // A rule removed mid-evaluation must not resurrect its alerts.
            if !self.rules.contains(&rule.id) {
                tracing::debug!(rule_id = %rule.id, "Discarding result for removed rule");
                return Outcome::Unchanged;
            }

            match alerts.get_mut(&fp) {
                None if !should_fire => (Outcome::Unchanged, None),
                None => {
                    let mut alert = new_alert(rule, &fp, value, now);
                    alert.record(
                        now,
                        EventType::Firing,
                        "Alert condition met, pending",
                        Some(value),
                        None,
                    );
                    let transition = if !silences.is_empty() {
                        suppress(&mut alert, silences, now);
                        None
                    } else if rule.for_secs == 0 {
                        Some(promote(&mut alert, now))
                    } else {
                        None
                    };
                    let state = alert.state;
                    alerts.insert(fp.clone(), alert);
                    (Outcome::Created(state), transition)
                }
                Some(alert) => step(alert, rule, should_fire, value, silences, now),
            }
        };

        match outcome {
            Outcome::Created(_) | Outcome::Reopened(_) => self.rules.record_trigger(&rule.id),
            _ => {}
        }
        if outcome != Outcome::Unchanged {
            tracing::debug!(rule_id = %rule.id, fingerprint = %fp, ?outcome, "Alert lifecycle step");
        }
        if let Some(transition) = transition {
            match &transition {
                Transition::Firing(a) => {
                    tracing::info!(fingerprint = %a.fingerprint, rule = %a.rule_name, severity = %a.severity, "Alert firing")
                }
                Transition::Resolved(a) => {
                    tracing::info!(fingerprint = %a.fingerprint, rule = %a.rule_name, "Alert resolved")
                }
            }
            self.dispatcher.dispatch(transition);
        }
        outcome
    }

    pub fn acknowledge(&self, fingerprint: &str, user: &str) -> Result<ActiveAlert> {
        let alert = self.alerts.acknowledge(fingerprint, user, Utc::now())?;
        tracing::info!(fingerprint, user, "Alert acknowledged");
        Ok(alert)
    }

    /// Forces the alert into `Resolved`. The next true evaluation reopens it
    /// as `Pending` even for rules with a zero `for` duration.
    pub fn resolve(&self, fingerprint: &str, user: &str) -> Result<ActiveAlert> {
        let (alert, announce) = self.alerts.resolve(fingerprint, user, Utc::now())?;
        if announce {
            tracing::info!(fingerprint, user, "Alert manually resolved");
            self.dispatcher.dispatch(Transition::Resolved(alert.clone()));
        }
        Ok(alert)
    }
}

fn new_alert(rule: &AlertRule, fp: &str, value: f64, now: DateTime<Utc>) -> ActiveAlert {
    ActiveAlert {
        fingerprint: fp.to_string(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        severity: rule.severity,
        state: AlertState::Pending,
        labels: rule.labels.clone(),
        annotations: rule.annotations.clone(),
        starts_at: now,
        ends_at: None,
        last_notified: None,
        notification_count: 0,
        value,
        inhibited: false,
        inhibited_by: Vec::new(),
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        notification_group: rule.notification_group.clone(),
        escalation_policy: rule.escalation_policy.clone(),
        history: Vec::new(),
    }
}

fn promote(alert: &mut ActiveAlert, now: DateTime<Utc>) -> Transition {
    alert.state = AlertState::Firing;
    alert.last_notified = Some(now);
    alert.notification_count += 1;
    alert.record(
        now,
        EventType::Firing,
        "Alert firing",
        Some(alert.value),
        None,
    );
    Transition::Firing(alert.clone())
}

fn suppress(alert: &mut ActiveAlert, silences: Vec<String>, now: DateTime<Utc>) {
    let description = format!("Alert suppressed by {}", silences.join(", "));
    alert.state = AlertState::Suppressed;
    alert.inhibited = true;
    alert.inhibited_by = silences;
    alert.record(now, EventType::Suppressed, description, Some(alert.value), None);
}

fn pending_elapsed(alert: &ActiveAlert, rule: &AlertRule, now: DateTime<Utc>) -> bool {
    rule.for_duration()
        .is_some_and(|wait| now.signed_duration_since(alert.starts_at) >= wait)
}

fn step(
    alert: &mut ActiveAlert,
    rule: &AlertRule,
    should_fire: bool,
    value: f64,
    silences: Vec<String>,
    now: DateTime<Utc>,
) -> (Outcome, Option<Transition>) {
    let silenced = !silences.is_empty();

    if !should_fire {
        if alert.state == AlertState::Resolved {
            return (Outcome::Unchanged, None);
        }
        let announce =
            matches!(alert.state, AlertState::Pending | AlertState::Firing) && !silenced;
        alert.state = AlertState::Resolved;
        alert.ends_at = Some(now);
        alert.value = value;
        alert.inhibited = false;
        alert.inhibited_by.clear();
        alert.record(
            now,
            EventType::Resolved,
            "Alert condition cleared",
            Some(value),
            None,
        );
        let transition = announce.then(|| Transition::Resolved(alert.clone()));
        return (Outcome::Resolved, transition);
    }

    alert.value = value;
    match alert.state {
        AlertState::Resolved => {
            let manually_resolved = alert.resolved_by.is_some();
            alert.state = AlertState::Pending;
            alert.starts_at = now;
            alert.ends_at = None;
            alert.acknowledged_by = None;
            alert.acknowledged_at = None;
            alert.resolved_by = None;
            alert.record(
                now,
                EventType::Firing,
                "Alert condition met again, pending",
                Some(value),
                None,
            );
            let transition = if silenced {
                suppress(alert, silences, now);
                None
            } else if rule.for_secs == 0 && !manually_resolved {
                Some(promote(alert, now))
            } else {
                None
            };
            (Outcome::Reopened(alert.state), transition)
        }
        _ if silenced => {
            if alert.state == AlertState::Suppressed {
                alert.inhibited_by = silences;
                (Outcome::Updated, None)
            } else {
                suppress(alert, silences, now);
                (Outcome::Suppressed, None)
            }
        }
        AlertState::Suppressed => {
            alert.state = AlertState::Pending;
            alert.inhibited = false;
            alert.inhibited_by.clear();
            if pending_elapsed(alert, rule, now) {
                (Outcome::Unsuppressed, Some(promote(alert, now)))
            } else {
                (Outcome::Unsuppressed, None)
            }
        }
        AlertState::Pending if pending_elapsed(alert, rule, now) => {
            (Outcome::Promoted, Some(promote(alert, now)))
        }
        AlertState::Pending | AlertState::Firing => (Outcome::Updated, None),
    }
}
