use crate::channels::check_response;
use crate::plugin::ChannelPlugin;
use crate::{alert_payload, NotificationChannel, NotificationKind};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use vigil_common::types::{format_labels, ActiveAlert};

/// Posts the alert to an arbitrary HTTP endpoint, either as the standard
/// JSON payload or rendered through a `{{placeholder}}` body template.
pub struct WebhookChannel {
    instance_id: String,
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    body_template: Option<String>,
}

impl WebhookChannel {
    pub fn new(instance_id: &str, config: WebhookConfig) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            url: config.url,
            headers: config.headers,
            body_template: config.body_template,
        }
    }

    pub(crate) fn render_body(&self, alert: &ActiveAlert, kind: NotificationKind) -> String {
        match &self.body_template {
            Some(template) => template
                .replace("{{kind}}", &kind.to_string())
                .replace("{{fingerprint}}", &alert.fingerprint)
                .replace("{{rule_id}}", &alert.rule_id)
                .replace("{{rule_name}}", &alert.rule_name)
                .replace("{{severity}}", &alert.severity.to_string())
                .replace("{{state}}", &alert.state.to_string())
                .replace("{{value}}", &format!("{:.2}", alert.value))
                .replace("{{labels}}", &format_labels(&alert.labels))
                .replace("{{starts_at}}", &alert.starts_at.to_rfc3339()),
            None => alert_payload(alert, kind).to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, alert: &ActiveAlert, kind: NotificationKind) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(self.render_body(alert, kind));
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.send().await?;
        check_response("webhook", resp).await?;
        tracing::debug!(
            channel = %self.instance_id,
            fingerprint = %alert.fingerprint,
            %kind,
            "Webhook delivered"
        );
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_template: Option<String>,
}

pub struct WebhookPlugin;

impl WebhookPlugin {
    fn parse(settings: &Value) -> Result<WebhookConfig> {
        let cfg: WebhookConfig = serde_json::from_value(settings.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        if !(cfg.url.starts_with("http://") || cfg.url.starts_with("https://")) {
            anyhow::bail!("Invalid webhook config: url must be http(s), got '{}'", cfg.url);
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, settings: &Value) -> Result<()> {
        Self::parse(settings).map(|_| ())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        settings: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(WebhookChannel::new(
            instance_id,
            Self::parse(settings)?,
        )))
    }
}
