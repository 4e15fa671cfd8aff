//! Shared types for the tabsync engine and its hosts.
//!
//! This crate pins down the surfaces that outlive a single process: the key
//! space of the persistent store, the browser model handed across the
//! window/tab provider boundary, and the inbound message format. Hosts (the
//! browser shell, the CLI) reuse these types to construct valid requests
//! without drifting from the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys used in the persistent key-value store.
///
/// ```text
/// projects                    ["Work", "Home"]
/// projectTabs                 { "Work": ["https://a", "https://b"] }
/// selectedProject_<windowId>  "Work"
/// selectedProject             "Work"      (last project opened into a new window)
/// carryOverTabs               { "10": "https://x" }
/// projectToOpen               "Work"      (consumed once by the new-window flow)
/// eventLogs                   ["2026-01-31T00:00:00Z - Extension started"]
/// ```
pub mod keys {
    use super::WindowId;

    pub const PROJECTS: &str = "projects";
    pub const PROJECT_TABS: &str = "projectTabs";
    pub const SELECTED_PROJECT: &str = "selectedProject";
    pub const SELECTED_PROJECT_PREFIX: &str = "selectedProject_";
    pub const CARRY_OVER_TABS: &str = "carryOverTabs";
    pub const PROJECT_TO_OPEN: &str = "projectToOpen";
    pub const EVENT_LOGS: &str = "eventLogs";
    pub const INITIALIZED: &str = "initialized";

    pub fn selected_project(window_id: WindowId) -> String {
        format!("{}{}", SELECTED_PROJECT_PREFIX, window_id)
    }

    /// Extracts the window id from a `selectedProject_<windowId>` key.
    /// Returns None for any other key, including the bare `selectedProject`.
    pub fn parse_selected_project(key: &str) -> Option<WindowId> {
        key.strip_prefix(SELECTED_PROJECT_PREFIX)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(WindowId)
    }
}

/// Tab identifier assigned by the browser. Only valid while that tab instance exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

/// Window identifier assigned by the browser. Only valid while the window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub state: WindowState,
}

impl Window {
    pub fn is_maximized(&self) -> bool {
        self.state == WindowState::Maximized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub index: u32,
    /// Empty while the tab has not committed a navigation yet.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

/// Filter for tab queries. An empty query matches every tab in every window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabQuery {
    pub window_id: Option<WindowId>,
}

impl TabQuery {
    pub fn all() -> Self {
        Self { window_id: None }
    }

    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
        }
    }

    pub fn matches(&self, tab: &Tab) -> bool {
        self.window_id.map_or(true, |id| tab.window_id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTabProps {
    pub window_id: WindowId,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateWindowProps {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub state: WindowState,
}

impl CreateWindowProps {
    /// Props for a window shaped like `source`: maximized windows are recreated
    /// maximized without explicit dimensions, everything else keeps its size.
    pub fn replicating(source: &Window) -> Self {
        if source.is_maximized() {
            Self {
                width: None,
                height: None,
                state: WindowState::Maximized,
            }
        } else {
            Self {
                width: source.width,
                height: source.height,
                state: WindowState::Normal,
            }
        }
    }
}

/// Destination of a tab move. `index: -1` appends at the end of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTarget {
    pub window_id: WindowId,
    pub index: i32,
}

impl MoveTarget {
    pub fn end_of(window_id: WindowId) -> Self {
        Self {
            window_id,
            index: -1,
        }
    }
}

/// Messages posted to the engine over the host's generic message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Open `project` in the next window that gets created.
    SetNewWindowProject { project: String },
    ClearSelectedProject,
    Refresh,
}

pub fn parse_message(raw: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(raw)
}
