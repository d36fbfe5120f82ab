use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::types::capped_seconds;

fn default_interval_secs() -> u64 {
    60
}

fn default_max_burst() -> u32 {
    10
}

/// At most `max_burst` sends per channel in any `interval_secs` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_burst")]
    pub max_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_burst: default_max_burst(),
        }
    }
}

/// Fixed-window counter. The window restarts on the first send after the
/// previous one expired.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window_start: Option<DateTime<Utc>>,
    used: u32,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window_start: None,
            used: 0,
        }
    }

    /// Takes one slot, returning `false` when the window is exhausted.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        let interval = capped_seconds(self.config.interval_secs);
        let expired = self.window_start.map_or(true, |start| now - start >= interval);
        if expired {
            self.window_start = Some(now);
            self.used = 0;
        }
        if self.used >= self.config.max_burst {
            return false;
        }
        self.used += 1;
        true
    }
}
