use crate::error::{NotifyError, Result};
use crate::NotificationChannel;
use serde_json::Value;
use std::collections::HashMap;

/// Factory for creating [`NotificationChannel`] instances from JSON
/// settings.
///
/// Each plugin is registered in the [`ChannelRegistry`] under its `name()`,
/// which is the `channel_type` used in configuration.
pub trait ChannelPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Checks `settings` against this plugin's expected shape.
    fn validate_config(&self, settings: &Value) -> anyhow::Result<()>;

    /// Creates a channel from validated settings.
    fn create_channel(
        &self,
        instance_id: &str,
        settings: &Value,
    ) -> anyhow::Result<Box<dyn NotificationChannel>>;

    /// Returns `settings` with secrets masked, for logs and API responses.
    fn redact_config(&self, settings: &Value) -> Value {
        crate::utils::redact_settings(settings)
    }
}

/// Registry of available [`ChannelPlugin`]s.
///
/// # Examples
///
/// ```
/// use vigil_notify::plugin::ChannelRegistry;
///
/// let registry = ChannelRegistry::default();
/// assert!(registry.has_plugin("webhook"));
/// assert!(registry.has_plugin("slack"));
/// assert!(registry.has_plugin("pagerduty"));
/// assert!(!registry.has_plugin("carrier-pigeon"));
/// ```
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn create_channel(
        &self,
        type_name: &str,
        instance_id: &str,
        settings: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| NotifyError::UnknownChannelType(type_name.to_string()))?;
        plugin
            .validate_config(settings)
            .and_then(|_| plugin.create_channel(instance_id, settings))
            .map_err(|e| NotifyError::InvalidConfig(format!("channel '{instance_id}': {e}")))
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::webhook::WebhookPlugin));
        registry.register(Box::new(crate::channels::slack::SlackPlugin));
        registry.register(Box::new(crate::channels::pagerduty::PagerDutyPlugin));
        registry
    }
}
