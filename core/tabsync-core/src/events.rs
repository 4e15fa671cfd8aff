//! Lifecycle events delivered by the browser host.
//!
//! Events arrive asynchronously and in no guaranteed order relative to the
//! engine's own provider calls. The engine handles each one on its own task
//! (see [`crate::engine::SyncEngine::dispatch`]).

use tabsync_protocol::{InboundMessage, Tab, TabId, Window, WindowId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    TabCreated(Tab),
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
    },
    /// Tab left a window (first half of a move).
    TabDetached {
        tab_id: TabId,
        window_id: WindowId,
    },
    /// Tab joined a window (second half of a move), possibly under a new id.
    TabAttached {
        tab_id: TabId,
        window_id: WindowId,
    },
    /// `url` is only set when the change was a navigation.
    TabUpdated {
        tab_id: TabId,
        url: Option<String>,
    },
    WindowCreated(Window),
    WindowRemoved(WindowId),
    Message(InboundMessage),
}

impl BrowserEvent {
    /// Short label used as the reconcile source in logs.
    pub fn source(&self) -> &'static str {
        match self {
            BrowserEvent::TabCreated(_) => "tabs.onCreated",
            BrowserEvent::TabRemoved { .. } => "tabs.onRemoved",
            BrowserEvent::TabDetached { .. } => "tabs.onDetached",
            BrowserEvent::TabAttached { .. } => "tabs.onAttached",
            BrowserEvent::TabUpdated { .. } => "tabs.onUpdated",
            BrowserEvent::WindowCreated(_) => "windows.onCreated",
            BrowserEvent::WindowRemoved(_) => "windows.onRemoved",
            BrowserEvent::Message(_) => "runtime.onMessage",
        }
    }
}
