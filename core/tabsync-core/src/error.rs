//! Error types for tabsync-core operations.
//!
//! Only `DuplicateProject`, `SwitchInProgress` and `NoPendingSwitch` are meant
//! to reach the user. Store and provider failures are logged at the event
//! boundary and the affected step is skipped.

use std::path::PathBuf;

use tabsync_protocol::{TabId, WindowId};

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures from a [`crate::store::KeyValueStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend failed: {0}")]
    Backend(String),

    #[error("Failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store file I/O failed: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures from a [`crate::provider::TabProvider`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The tab or window closed before the call reached it. Ids are inherently
    /// racy against concurrent closes, so callers treat this as a no-op.
    #[error("Stale reference: {0}")]
    NotFound(StaleRef),

    #[error("Provider call {call} failed: {message}")]
    Call { call: &'static str, message: String },
}

impl ProviderError {
    pub fn call(call: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Call {
            call,
            message: message.into(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleRef {
    Tab(TabId),
    Window(WindowId),
}

impl std::fmt::Display for StaleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleRef::Tab(id) => write!(f, "tab {}", id),
            StaleRef::Window(id) => write!(f, "window {}", id),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in tabsync-core operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────────────
    // User-facing
    // ─────────────────────────────────────────────────────────────────────
    #[error("Project name is empty or already exists: {0:?}")]
    DuplicateProject(String),

    #[error("A project switch is already in progress; try again once it finishes")]
    SwitchInProgress,

    #[error("No project switch is awaiting confirmation")]
    NoPendingSwitch,

    // ─────────────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<SyncError> for String {
    fn from(err: SyncError) -> String {
        err.to_string()
    }
}
