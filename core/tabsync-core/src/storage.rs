//! Storage configuration and path management for tabsync.
//!
//! All file paths the engine and CLI touch are decided here, so tests can
//! inject a temp directory with [`StorageConfig::with_root`] and production
//! code uses `~/.tabsync/`.

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".tabsync";

/// Central configuration for all tabsync storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = dirs::home_dir()
            .map(|home| home.join(ROOT_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(ROOT_DIR_NAME));
        Self { root }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to store.json (the persisted key-value store).
    pub fn store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }

    /// Path to config.toml (timing and log settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to logs/ (rolling tracing output from the CLI).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
