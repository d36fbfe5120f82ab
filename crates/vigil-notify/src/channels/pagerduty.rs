use crate::channels::check_response;
use crate::plugin::ChannelPlugin;
use crate::{alert_payload, summary_line, NotificationChannel, NotificationKind};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_common::types::{ActiveAlert, Severity};

const DEFAULT_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// PagerDuty Events API v2 channel. The alert fingerprint is the dedup key,
/// so a resolution closes the incident its firing opened.
pub struct PagerDutyChannel {
    instance_id: String,
    client: reqwest::Client,
    config: PagerDutyConfig,
}

impl PagerDutyChannel {
    pub fn new(instance_id: &str, config: PagerDutyConfig) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            config,
        }
    }

    pub(crate) fn build_event(&self, alert: &ActiveAlert, kind: NotificationKind) -> Value {
        let action = match kind {
            NotificationKind::Resolved => "resolve",
            NotificationKind::Firing | NotificationKind::Escalation => "trigger",
        };
        let severity = match alert.severity {
            Severity::Critical => "critical",
            Severity::High => "error",
            Severity::Medium | Severity::Low => "warning",
            Severity::Info => "info",
        };
        json!({
            "routing_key": self.config.routing_key,
            "event_action": action,
            "dedup_key": alert.fingerprint,
            "payload": {
                "summary": summary_line(alert, kind),
                "source": self.config.source.as_deref().unwrap_or(alert.rule_id.as_str()),
                "severity": severity,
                "timestamp": alert.starts_at.to_rfc3339(),
                "custom_details": alert_payload(alert, kind),
            },
        })
    }
}

#[async_trait]
impl NotificationChannel for PagerDutyChannel {
    async fn send(&self, alert: &ActiveAlert, kind: NotificationKind) -> Result<()> {
        let resp = self
            .client
            .post(&self.config.api_url)
            .json(&self.build_event(alert, kind))
            .send()
            .await?;
        check_response("pagerduty", resp).await
    }

    fn channel_type(&self) -> &str {
        "pagerduty"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

fn default_api_url() -> String {
    DEFAULT_EVENTS_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagerDutyConfig {
    pub routing_key: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Overrides the event source, which defaults to the rule ID.
    #[serde(default)]
    pub source: Option<String>,
}

pub struct PagerDutyPlugin;

impl PagerDutyPlugin {
    fn parse(settings: &Value) -> Result<PagerDutyConfig> {
        let cfg: PagerDutyConfig = serde_json::from_value(settings.clone())
            .map_err(|e| anyhow::anyhow!("Invalid pagerduty config: {e}"))?;
        if cfg.routing_key.len() != 32 {
            anyhow::bail!("Invalid pagerduty config: routing_key must be 32 characters");
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for PagerDutyPlugin {
    fn name(&self) -> &str {
        "pagerduty"
    }

    fn validate_config(&self, settings: &Value) -> Result<()> {
        Self::parse(settings).map(|_| ())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        settings: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(PagerDutyChannel::new(
            instance_id,
            Self::parse(settings)?,
        )))
    }
}
