//! Runtime configuration for the sync engine.
//!
//! Loaded from `~/.tabsync/config.toml`. A missing file yields defaults; a file
//! that exists but can't be read or parsed is an error, so a typo never
//! silently reverts the timing behavior.
//!
//! ```toml
//! debounce_ms = 2000
//! window_settle_ms = 1000
//! event_log_capacity = 500
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;
pub const DEFAULT_WINDOW_SETTLE_MS: u64 = 1000;
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a shrinking tab snapshot is persisted.
    pub debounce_ms: u64,
    /// Wait after creating a window before its tabs are inspected.
    pub window_settle_ms: u64,
    /// Oldest diagnostic log entries are dropped beyond this count.
    pub event_log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            window_settle_ms: DEFAULT_WINDOW_SETTLE_MS,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn window_settle(&self) -> Duration {
        Duration::from_millis(self.window_settle_ms)
    }
}

pub fn load_config(path: Option<PathBuf>) -> Result<SyncConfig> {
    let config_path = match path {
        Some(path) => path,
        None => crate::storage::StorageConfig::default().config_file(),
    };

    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| SyncError::Io {
        context: format!("Failed to read config {}", config_path.display()),
        source,
    })?;
    toml::from_str::<SyncConfig>(&content).map_err(|err| SyncError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}
