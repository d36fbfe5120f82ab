use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::matcher::{matches_all, LabelMatcher};
use vigil_common::types::{ActiveAlert, Severity};

/// Daily time-of-day window in UTC, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let current_time = now.time();
        if self.start <= self.end {
            current_time >= self.start && current_time <= self.end
        } else {
            // Overnight window (e.g., 23:00 - 03:00)
            current_time >= self.start || current_time <= self.end
        }
    }
}

/// When a channel accepts an alert. All set criteria must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationCondition {
    /// Minimum severity; absent accepts every severity.
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub matchers: Vec<LabelMatcher>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Minimum spacing between two notifications for the same alert on
    /// this channel.
    #[serde(default)]
    pub min_interval_secs: u64,
}

impl NotificationCondition {
    pub fn matches(&self, alert: &ActiveAlert, now: DateTime<Utc>) -> bool {
        self.severity.map_or(true, |min| alert.severity >= min)
            && matches_all(&self.matchers, &alert.labels)
            && self.time_window.map_or(true, |w| w.is_active(now))
    }

    /// Compiles regex matchers loaded from configuration.
    pub fn compile(&mut self) -> Result<(), regex::Error> {
        self.matchers.iter_mut().try_for_each(LabelMatcher::compile)
    }
}

/// Selects the conditions of a channel that accept `alert`.
///
/// A channel without conditions accepts everything with no minimum interval;
/// otherwise the strictest `min_interval_secs` among matching conditions
/// applies. `None` means the channel does not accept the alert.
pub fn route(
    conditions: &[NotificationCondition],
    alert: &ActiveAlert,
    now: DateTime<Utc>,
) -> Option<u64> {
    if conditions.is_empty() {
        return Some(0);
    }
    conditions
        .iter()
        .filter(|c| c.matches(alert, now))
        .map(|c| c.min_interval_secs)
        .max()
}
