use crate::error::{NotifyError, Result};
use crate::plugin::ChannelRegistry;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::routing::{route, NotificationCondition};
use crate::{NotificationChannel, NotificationKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use vigil_alert::dispatch::Notifier;
use vigil_common::types::{capped_seconds, ActiveAlert};

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    10
}

/// One `[[channels]]` entry of the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub channel_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Plugin-specific settings, validated by the plugin.
    #[serde(default)]
    pub settings: serde_json::Value,
    /// The channel accepts an alert when any condition matches. No
    /// conditions means every alert.
    #[serde(default)]
    pub conditions: Vec<NotificationCondition>,
    /// Notification groups served by this channel. Alerts carrying a
    /// `notification_group` only reach channels that list it.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Extra attempts after the first failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ChannelConfig {
    fn serves(&self, alert: &ActiveAlert) -> bool {
        match &alert.notification_group {
            Some(group) => self.groups.iter().any(|g| g == group),
            None => true,
        }
    }
}

struct ManagedChannel {
    config: ChannelConfig,
    channel: Box<dyn NotificationChannel>,
    limiter: Option<Mutex<RateLimiter>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NotifyStats {
    pub sent: u64,
    pub failed: u64,
    pub throttled: u64,
}

/// Routes alerts to channels and delivers them with timeouts, retries and
/// throttling.
pub struct NotificationManager {
    channels: Vec<ManagedChannel>,
    /// Last successful send per `(channel id, fingerprint)`.
    last_sent: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    max_min_interval: Duration,
    sent: AtomicU64,
    failed: AtomicU64,
    throttled: AtomicU64,
}

impl NotificationManager {
    /// Resolves every configured channel through `registry`. Unknown types,
    /// invalid settings and duplicate IDs fail the whole load.
    pub fn from_configs(registry: &ChannelRegistry, configs: Vec<ChannelConfig>) -> Result<Self> {
        let mut channels = Vec::with_capacity(configs.len());
        for config in configs {
            let channel =
                registry.create_channel(&config.channel_type, &config.id, &config.settings)?;
            if let Some(plugin) = registry.get_plugin(&config.channel_type) {
                tracing::debug!(
                    channel = %config.id,
                    channel_type = %config.channel_type,
                    settings = %plugin.redact_config(&config.settings),
                    "Notification channel configured"
                );
            }
            channels.push((config, channel));
        }
        Self::with_channels(channels)
    }

    /// Builds a manager from already constructed channels.
    pub fn with_channels(
        channels: Vec<(ChannelConfig, Box<dyn NotificationChannel>)>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut managed = Vec::with_capacity(channels.len());
        let mut max_min_interval = 0;

        for (mut config, channel) in channels {
            if config.id.trim().is_empty() {
                return Err(NotifyError::InvalidConfig("channel id must not be empty".into()));
            }
            if !seen.insert(config.id.clone()) {
                return Err(NotifyError::DuplicateChannel(config.id));
            }
            for condition in &mut config.conditions {
                condition.compile().map_err(|e| {
                    NotifyError::InvalidConfig(format!("channel '{}': {e}", config.id))
                })?;
                max_min_interval = max_min_interval.max(condition.min_interval_secs);
            }
            let limiter = config.rate_limit.map(|rl| Mutex::new(RateLimiter::new(rl)));
            managed.push(ManagedChannel {
                config,
                channel,
                limiter,
            });
        }

        tracing::info!(channels = managed.len(), "Notification manager initialized");
        Ok(Self {
            channels: managed,
            last_sent: Mutex::new(HashMap::new()),
            max_min_interval: capped_seconds(max_min_interval),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        })
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.config.id.as_str()).collect()
    }

    pub fn has_channel(&self, id: &str) -> bool {
        self.channels.iter().any(|c| c.config.id == id)
    }

    pub fn stats(&self) -> NotifyStats {
        NotifyStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }

    /// Sends through every enabled channel whose conditions accept the alert.
    ///
    /// Returns how many channels delivered. All candidates are attempted even
    /// if one fails; the first failure is then returned.
    pub async fn notify(&self, alert: &ActiveAlert, kind: NotificationKind) -> Result<usize> {
        let now = Utc::now();
        let mut delivered = 0;
        let mut first_error = None;

        for managed in &self.channels {
            if !managed.config.enabled || !managed.config.serves(alert) {
                continue;
            }
            let Some(min_interval) = route(&managed.config.conditions, alert, now) else {
                continue;
            };
            if kind != NotificationKind::Resolved
                && self.sent_recently(&managed.config.id, &alert.fingerprint, min_interval, now)
            {
                self.throttled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    channel = %managed.config.id,
                    fingerprint = %alert.fingerprint,
                    "Notification skipped, minimum interval not elapsed"
                );
                continue;
            }

            match self.deliver(managed, alert, kind).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Sends through the named channels regardless of their routing
    /// conditions. Used by escalation steps. Unknown or disabled channels
    /// are skipped.
    pub async fn send_to(
        &self,
        channel_ids: &[String],
        alert: &ActiveAlert,
        kind: NotificationKind,
    ) -> Result<usize> {
        let mut delivered = 0;
        let mut first_error = None;

        for id in channel_ids {
            let Some(managed) = self.channels.iter().find(|c| &c.config.id == id) else {
                tracing::warn!(channel = %id, "Escalation references unknown channel");
                continue;
            };
            if !managed.config.enabled {
                continue;
            }
            match self.deliver(managed, alert, kind).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    fn sent_recently(
        &self,
        channel_id: &str,
        fingerprint: &str,
        min_interval_secs: u64,
        now: DateTime<Utc>,
    ) -> bool {
        if min_interval_secs == 0 {
            return false;
        }
        let key = (channel_id.to_string(), fingerprint.to_string());
        self.last_sent
            .lock()
            .get(&key)
            .is_some_and(|last| now - *last < capped_seconds(min_interval_secs))
    }

    fn record_sent(&self, channel_id: &str, fingerprint: &str, now: DateTime<Utc>) {
        let mut last_sent = self.last_sent.lock();
        let horizon = self.max_min_interval;
        last_sent.retain(|_, at| now - *at < horizon);
        if horizon > Duration::zero() {
            last_sent.insert((channel_id.to_string(), fingerprint.to_string()), now);
        }
    }

    /// One channel delivery: rate limit, then up to `1 + retries` attempts
    /// each bounded by `timeout_secs`, backing off 100ms, 200ms, 400ms...
    /// `Ok(false)` means the rate limit dropped the send.
    async fn deliver(
        &self,
        managed: &ManagedChannel,
        alert: &ActiveAlert,
        kind: NotificationKind,
    ) -> Result<bool> {
        let config = &managed.config;
        if let Some(limiter) = &managed.limiter {
            if !limiter.lock().try_acquire(Utc::now()) {
                self.throttled.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %config.id, fingerprint = %alert.fingerprint, "Channel rate limit reached, notification dropped");
                return Ok(false);
            }
        }

        let timeout = std::time::Duration::from_secs(config.timeout_secs.max(1));
        let attempts = config.retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match tokio::time::timeout(timeout, managed.channel.send(alert, kind)).await {
                Ok(Ok(())) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    self.record_sent(&config.id, &alert.fingerprint, Utc::now());
                    tracing::info!(
                        channel = %config.id,
                        channel_type = managed.channel.channel_type(),
                        fingerprint = %alert.fingerprint,
                        %kind,
                        "Notification sent"
                    );
                    return Ok(true);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {}s", timeout.as_secs()),
            }
            tracing::warn!(
                channel = %config.id,
                attempt = attempt + 1,
                error = %last_error,
                "Notification attempt failed"
            );
            if attempt + 1 < attempts {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt.min(10))))
                    .await;
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(channel = %config.id, fingerprint = %alert.fingerprint, error = %last_error, "Notification failed");
        Err(NotifyError::DeliveryFailed {
            channel: config.id.clone(),
            attempts,
            reason: last_error,
        })
    }
}

#[async_trait]
impl Notifier for NotificationManager {
    async fn notify_firing(&self, alert: &ActiveAlert) -> anyhow::Result<()> {
        self.notify(alert, NotificationKind::Firing).await?;
        Ok(())
    }

    async fn notify_resolved(&self, alert: &ActiveAlert) -> anyhow::Result<()> {
        self.notify(alert, NotificationKind::Resolved).await?;
        Ok(())
    }
}
