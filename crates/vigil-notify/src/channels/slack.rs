use crate::channels::check_response;
use crate::plugin::ChannelPlugin;
use crate::{summary_line, NotificationChannel, NotificationKind};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_common::types::{ActiveAlert, Severity};

/// Slack incoming-webhook channel.
pub struct SlackChannel {
    instance_id: String,
    client: reqwest::Client,
    config: SlackConfig,
}

impl SlackChannel {
    pub fn new(instance_id: &str, config: SlackConfig) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            config,
        }
    }

    pub(crate) fn build_message(&self, alert: &ActiveAlert, kind: NotificationKind) -> Value {
        let color = match (kind, alert.severity) {
            (NotificationKind::Resolved, _) => "good",
            (_, Severity::Critical | Severity::High) => "danger",
            (_, Severity::Medium) => "warning",
            _ => "#439FE0",
        };

        let mut fields = vec![
            json!({ "title": "Severity", "value": alert.severity.to_string(), "short": true }),
            json!({ "title": "Value", "value": format!("{:.2}", alert.value), "short": true }),
            json!({ "title": "Started", "value": alert.starts_at.to_rfc3339(), "short": true }),
        ];
        if let Some(summary) = alert.annotations.get("summary") {
            fields.push(json!({ "title": "Summary", "value": summary, "short": false }));
        }

        let mut message = json!({
            "text": summary_line(alert, kind),
            "attachments": [{
                "color": color,
                "fields": fields,
                "footer": format!("fingerprint {}", alert.fingerprint),
            }],
        });
        if let Some(channel) = &self.config.channel {
            message["channel"] = json!(channel);
        }
        if let Some(username) = &self.config.username {
            message["username"] = json!(username);
        }
        message
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    async fn send(&self, alert: &ActiveAlert, kind: NotificationKind) -> Result<()> {
        let resp = self
            .client
            .post(&self.config.webhook_url)
            .json(&self.build_message(alert, kind))
            .send()
            .await?;
        check_response("slack", resp).await
    }

    fn channel_type(&self) -> &str {
        "slack"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct SlackPlugin;

impl SlackPlugin {
    fn parse(settings: &Value) -> Result<SlackConfig> {
        let cfg: SlackConfig = serde_json::from_value(settings.clone())
            .map_err(|e| anyhow::anyhow!("Invalid slack config: {e}"))?;
        if cfg.webhook_url.trim().is_empty() {
            anyhow::bail!("Invalid slack config: webhook_url is empty");
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for SlackPlugin {
    fn name(&self) -> &str {
        "slack"
    }

    fn validate_config(&self, settings: &Value) -> Result<()> {
        Self::parse(settings).map(|_| ())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        settings: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(SlackChannel::new(instance_id, Self::parse(settings)?)))
    }
}
