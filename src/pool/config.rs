//! Pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{PoolError, PoolResult};

fn default_size() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_reaper_interval_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    10
}

/// Pool settings. Zero disables `timeout_ms`, `auto_release_ms` and
/// `auto_close_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of live handles
    #[serde(default = "default_size")]
    pub size: usize,

    /// How long `acquire` waits once the pool is full (default: 30s)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Force-release handles leased for longer than this
    #[serde(default)]
    pub auto_release_ms: u64,

    /// Close handles idle for longer than this
    #[serde(default)]
    pub auto_close_ms: u64,

    /// Reaper tick (default: 100ms)
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,

    /// Re-check interval for a blocked `acquire` (default: 10ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(default_size())
    }
}

impl PoolConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            timeout_ms: default_timeout_ms(),
            auto_release_ms: 0,
            auto_close_ms: 0,
            reaper_interval_ms: default_reaper_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_auto_release(mut self, after: Duration) -> Self {
        self.auto_release_ms = after.as_millis() as u64;
        self
    }

    pub fn with_auto_close(mut self, after: Duration) -> Self {
        self.auto_close_ms = after.as_millis() as u64;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    fn optional(ms: u64) -> Option<Duration> {
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn timeout(&self) -> Option<Duration> {
        Self::optional(self.timeout_ms)
    }

    pub fn auto_release(&self) -> Option<Duration> {
        Self::optional(self.auto_release_ms)
    }

    pub fn auto_close(&self) -> Option<Duration> {
        Self::optional(self.auto_close_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total time `acquire` may block: the timeout plus the auto-release
    /// window, since a leased handle comes back at the latest then.
    /// `None` waits forever.
    pub fn acquire_deadline(&self) -> Option<Duration> {
        let timeout = self.timeout()?;
        Some(timeout + self.auto_release().unwrap_or_default())
    }

    /// True when a reaper thread has work to do
    pub fn needs_reaper(&self) -> bool {
        self.auto_release_ms > 0 || self.auto_close_ms > 0
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.size == 0 {
            return Err(PoolError::InvalidConfig("size must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(PoolError::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.needs_reaper() && self.reaper_interval_ms == 0 {
            return Err(PoolError::InvalidConfig("reaper_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
