//! Notification delivery, escalation and suppression for alert lifecycle
//! edges.
//!
//! Channels are resolved from configuration once, through the
//! [`plugin::ChannelRegistry`], into [`NotificationChannel`] trait objects.
//! [`manager::NotificationManager`] routes alerts to them and implements the
//! engine's `Notifier` contract; [`escalation::EscalationManager`] and
//! [`suppression::SuppressionManager`] implement `Escalator` and
//! `Suppressor`.

pub mod channels;
pub mod error;
pub mod escalation;
pub mod manager;
pub mod plugin;
pub mod rate_limit;
pub mod routing;
pub mod suppression;
pub mod utils;


use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use vigil_common::types::{format_labels, ActiveAlert};

/// Why a notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Firing,
    Resolved,
    /// Sent by an escalation step while the alert stays unhandled.
    Escalation,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Firing => write!(f, "firing"),
            NotificationKind::Resolved => write!(f, "resolved"),
            NotificationKind::Escalation => write!(f, "escalation"),
        }
    }
}

/// A delivery transport such as a webhook or a paging service.
///
/// Implementations perform a single delivery attempt; retries, timeouts and
/// throttling are applied by the [`manager::NotificationManager`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the remote endpoint could not be reached or
    /// answered with a non-success status.
    async fn send(&self, alert: &ActiveAlert, kind: NotificationKind) -> Result<()>;

    /// The plugin type name, e.g. `"webhook"`.
    fn channel_type(&self) -> &str;

    /// The configured channel ID.
    fn instance_id(&self) -> &str;
}

/// One-line human summary shared by the chat-style channels.
pub fn summary_line(alert: &ActiveAlert, kind: NotificationKind) -> String {
    let status = match kind {
        NotificationKind::Firing => "FIRING",
        NotificationKind::Resolved => "RESOLVED",
        NotificationKind::Escalation => "ESCALATED",
    };
    let labels = format_labels(&alert.labels);
    if labels.is_empty() {
        format!("[{status}][{}] {}", alert.severity, alert.rule_name)
    } else {
        format!(
            "[{status}][{}] {} ({labels})",
            alert.severity, alert.rule_name
        )
    }
}

/// Structured JSON body used by the webhook channel and as custom details
/// elsewhere.
pub fn alert_payload(alert: &ActiveAlert, kind: NotificationKind) -> serde_json::Value {
    serde_json::json!({
        "kind": kind,
        "fingerprint": alert.fingerprint,
        "rule_id": alert.rule_id,
        "rule_name": alert.rule_name,
        "severity": alert.severity,
        "state": alert.state,
        "value": alert.value,
        "labels": alert.labels,
        "annotations": alert.annotations,
        "starts_at": alert.starts_at.to_rfc3339(),
        "ends_at": alert.ends_at.map(|t| t.to_rfc3339()),
        "acknowledged_by": alert.acknowledged_by,
        "notification_count": alert.notification_count,
    })
}
