//! Store configuration
//!
//! Durations are carried as milliseconds so the config reads and writes
//! as plain JSON.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use crate::codec::TextConfig;

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_lock_poll_ms() -> u64 {
    10
}

/// On-disk table format
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreFormat {
    /// One JSON array of objects per table
    #[default]
    Json,
    /// Delimited text with a header line
    Text(TextConfig),
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one file per table
    pub dir: PathBuf,

    /// Table file extension; the format's default when unset
    #[serde(default)]
    pub extension: Option<String>,

    /// Identity field used by save (default: "_id")
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Maximum wait for the cross-process table lock (default: 30s)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Retry interval while the table lock is held elsewhere (default: 10ms)
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,

    #[serde(default)]
    pub format: StoreFormat,
}

impl StoreConfig {
    /// JSON tables in `dir`
    pub fn json(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: None,
            id_field: default_id_field(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_poll_ms: default_lock_poll_ms(),
            format: StoreFormat::Json,
        }
    }

    /// Delimited-text tables in `dir`
    pub fn text(dir: impl Into<PathBuf>, config: TextConfig) -> Self {
        Self {
            format: StoreFormat::Text(config),
            ..Self::json(dir)
        }
    }

    /// Parses a JSON config document
    pub fn from_json(text: &str) -> StoreResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_poll(mut self, poll: Duration) -> Self {
        self.lock_poll_ms = poll.as_millis() as u64;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    /// Rejects settings no connection can work with
    pub fn validate(&self) -> StoreResult<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("dir is empty".into()));
        }
        if self.id_field.is_empty() {
            return Err(StoreError::InvalidConfig("id_field is empty".into()));
        }
        if self.lock_poll_ms == 0 {
            return Err(StoreError::InvalidConfig("lock_poll_ms must be positive".into()));
        }
        if let Some(ext) = &self.extension {
            if ext.is_empty() || ext.contains(['/', '\\', '.']) {
                return Err(StoreError::InvalidConfig(format!("bad extension {:?}", ext)));
            }
        }
        Ok(())
    }
}
