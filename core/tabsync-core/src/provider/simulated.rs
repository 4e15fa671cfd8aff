//! In-process window/tab model.
//!
//! Stands in for a real browser in tests and in hosts that drive the engine
//! without one. Mirrors the browser behaviors the engine has to survive:
//!
//! - New windows open with a single blank tab and take focus
//! - Moving a tab to another window can hand it a fresh id
//! - Calls naming a closed tab or window fail with `NotFound`
//! - Removing a window's last tab leaves the (empty) window open
//!
//! Failures can be injected per tab to exercise partial-failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tabsync_protocol::{
    CreateTabProps, CreateWindowProps, MoveTarget, Tab, TabId, TabQuery, Window, WindowId,
    WindowState,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::TabProvider;
use crate::error::{ProviderError, StaleRef};
use crate::events::BrowserEvent;

const FIRST_WINDOW_ID: i64 = 1;
const FIRST_TAB_ID: i64 = 100;

struct BrowserState {
    windows: BTreeMap<WindowId, Window>,
    /// All tabs in strip order; a tab's index is its position among its window's tabs.
    tabs: Vec<Tab>,
    current: Option<WindowId>,
    next_window_id: i64,
    next_tab_id: i64,
    reassign_ids_on_move: bool,
    failing_moves: HashSet<TabId>,
    failing_removes: HashSet<TabId>,
    events: Option<UnboundedSender<BrowserEvent>>,
}

impl BrowserState {
    fn allocate_tab_id(&mut self) -> TabId {
        let id = TabId(self.next_tab_id);
        self.next_tab_id += 1;
        id
    }

    fn allocate_window_id(&mut self) -> WindowId {
        let id = WindowId(self.next_window_id);
        self.next_window_id += 1;
        id
    }

    fn emit(&self, event: BrowserEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn tabs_in(&self, window_id: WindowId) -> Vec<Tab> {
        self.tabs
            .iter()
            .filter(|tab| tab.window_id == window_id)
            .enumerate()
            .map(|(index, tab)| Tab {
                index: index as u32,
                ..tab.clone()
            })
            .collect()
    }

    fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    fn push_tab(&mut self, window_id: WindowId, url: &str, active: bool) -> Tab {
        if active {
            for tab in self.tabs.iter_mut().filter(|t| t.window_id == window_id) {
                tab.active = false;
            }
        }
        let tab = Tab {
            id: self.allocate_tab_id(),
            window_id,
            index: 0,
            url: url.to_string(),
            active,
        };
        self.tabs.push(tab.clone());
        let index = self.tabs_in(window_id).len().saturating_sub(1) as u32;
        let tab = Tab { index, ..tab };
        self.emit(BrowserEvent::TabCreated(tab.clone()));
        tab
    }

    fn insert_window(&mut self, width: Option<u32>, height: Option<u32>, state: WindowState) -> Window {
        let window = Window {
            id: self.allocate_window_id(),
            width,
            height,
            state,
        };
        self.windows.insert(window.id, window.clone());
        self.current = Some(window.id);
        self.emit(BrowserEvent::WindowCreated(window.clone()));
        window
    }
}

pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrowserState {
                windows: BTreeMap::new(),
                tabs: Vec::new(),
                current: None,
                next_window_id: FIRST_WINDOW_ID,
                next_tab_id: FIRST_TAB_ID,
                reassign_ids_on_move: true,
                failing_moves: HashSet::new(),
                failing_removes: HashSet::new(),
                events: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrowserState> {
        // A poisoned lock only means a test assertion panicked mid-call; the
        // model itself is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts delivering lifecycle events for every subsequent change.
    pub fn subscribe(&self) -> UnboundedReceiver<BrowserEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().events = Some(sender);
        receiver
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Direct manipulation (the user acting in the browser)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a focused normal window holding `urls`, first tab active.
    pub fn open_window(&self, urls: &[&str]) -> Window {
        self.open_window_shaped(Some(1280), Some(800), WindowState::Normal, urls)
    }

    pub fn open_window_shaped(
        &self,
        width: Option<u32>,
        height: Option<u32>,
        state: WindowState,
        urls: &[&str],
    ) -> Window {
        let mut browser = self.lock();
        let window = browser.insert_window(width, height, state);
        for (position, url) in urls.iter().enumerate() {
            browser.push_tab(window.id, url, position == 0);
        }
        window
    }

    pub fn open_tab(&self, window_id: WindowId, url: &str) -> Tab {
        self.lock().push_tab(window_id, url, false)
    }

    pub fn close_tab(&self, id: TabId) {
        let mut browser = self.lock();
        if let Some(position) = browser.position(id) {
            let tab = browser.tabs.remove(position);
            browser.emit(BrowserEvent::TabRemoved {
                tab_id: id,
                window_id: tab.window_id,
            });
        }
    }

    pub fn navigate(&self, id: TabId, url: &str) {
        let mut browser = self.lock();
        if let Some(position) = browser.position(id) {
            browser.tabs[position].url = url.to_string();
            browser.emit(BrowserEvent::TabUpdated {
                tab_id: id,
                url: Some(url.to_string()),
            });
        }
    }

    pub fn activate(&self, id: TabId) {
        let mut browser = self.lock();
        let Some(position) = browser.position(id) else {
            return;
        };
        let window_id = browser.tabs[position].window_id;
        for tab in browser.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.active = tab.id == id;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Fault injection
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn set_reassign_ids_on_move(&self, reassign: bool) {
        self.lock().reassign_ids_on_move = reassign;
    }

    pub fn fail_moves_for(&self, id: TabId) {
        self.lock().failing_moves.insert(id);
    }

    pub fn fail_removes_for(&self, id: TabId) {
        self.lock().failing_removes.insert(id);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.lock().windows.keys().copied().collect()
    }

    pub fn window(&self, id: WindowId) -> Option<Window> {
        self.lock().windows.get(&id).cloned()
    }

    pub fn tabs_in(&self, window_id: WindowId) -> Vec<Tab> {
        self.lock().tabs_in(window_id)
    }

    pub fn urls_in(&self, window_id: WindowId) -> Vec<String> {
        self.tabs_in(window_id)
            .into_iter()
            .map(|tab| tab.url)
            .collect()
    }

    pub fn tab(&self, id: TabId) -> Option<Tab> {
        let browser = self.lock();
        let window_id = browser.tabs.iter().find(|tab| tab.id == id)?.window_id;
        browser.tabs_in(window_id).into_iter().find(|tab| tab.id == id)
    }
}

#[async_trait]
impl TabProvider for SimulatedBrowser {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, ProviderError> {
        let browser = self.lock();
        let tabs = match query.window_id {
            Some(window_id) => browser.tabs_in(window_id),
            None => browser
                .windows
                .keys()
                .flat_map(|window_id| browser.tabs_in(*window_id))
                .collect(),
        };
        Ok(tabs.into_iter().filter(|tab| query.matches(tab)).collect())
    }

    async fn create_tab(&self, props: CreateTabProps) -> Result<Tab, ProviderError> {
        let mut browser = self.lock();
        if !browser.windows.contains_key(&props.window_id) {
            return Err(ProviderError::NotFound(StaleRef::Window(props.window_id)));
        }
        Ok(browser.push_tab(props.window_id, &props.url, false))
    }

    async fn remove_tabs(&self, ids: &[TabId]) -> Result<(), ProviderError> {
        let mut browser = self.lock();
        for id in ids {
            if browser.position(*id).is_none() {
                return Err(ProviderError::NotFound(StaleRef::Tab(*id)));
            }
            if browser.failing_removes.contains(id) {
                return Err(ProviderError::call("removeTabs", format!("tab {} is pinned", id)));
            }
        }
        for id in ids {
            if let Some(position) = browser.position(*id) {
                let tab = browser.tabs.remove(position);
                browser.emit(BrowserEvent::TabRemoved {
                    tab_id: *id,
                    window_id: tab.window_id,
                });
            }
        }
        Ok(())
    }

    async fn move_tabs(
        &self,
        ids: &[TabId],
        target: MoveTarget,
    ) -> Result<Vec<Tab>, ProviderError> {
        let mut browser = self.lock();
        if !browser.windows.contains_key(&target.window_id) {
            return Err(ProviderError::NotFound(StaleRef::Window(target.window_id)));
        }
        for id in ids {
            if browser.position(*id).is_none() {
                return Err(ProviderError::NotFound(StaleRef::Tab(*id)));
            }
            if browser.failing_moves.contains(id) {
                return Err(ProviderError::call("moveTabs", format!("tab {} refused to move", id)));
            }
        }

        let mut moved_ids = Vec::with_capacity(ids.len());
        for (offset, id) in ids.iter().enumerate() {
            let Some(position) = browser.position(*id) else {
                continue;
            };
            let mut tab = browser.tabs.remove(position);
            let source_window = tab.window_id;
            browser.emit(BrowserEvent::TabDetached {
                tab_id: tab.id,
                window_id: source_window,
            });

            if browser.reassign_ids_on_move {
                tab.id = browser.allocate_tab_id();
            }
            tab.window_id = target.window_id;
            tab.active = false;

            let insert_at = if target.index < 0 {
                browser.tabs.len()
            } else {
                let wanted = target.index as usize + offset;
                let window_positions: Vec<usize> = browser
                    .tabs
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.window_id == target.window_id)
                    .map(|(position, _)| position)
                    .collect();
                window_positions
                    .get(wanted)
                    .copied()
                    .unwrap_or(browser.tabs.len())
            };
            moved_ids.push(tab.id);
            browser.emit(BrowserEvent::TabAttached {
                tab_id: tab.id,
                window_id: target.window_id,
            });
            browser.tabs.insert(insert_at, tab);
        }

        let placed = browser.tabs_in(target.window_id);
        Ok(moved_ids
            .into_iter()
            .filter_map(|id| placed.iter().find(|tab| tab.id == id).cloned())
            .collect())
    }

    async fn create_window(&self, props: CreateWindowProps) -> Result<Window, ProviderError> {
        let mut browser = self.lock();
        let window = browser.insert_window(props.width, props.height, props.state);
        browser.push_tab(window.id, "", true);
        Ok(window)
    }

    async fn remove_window(&self, id: WindowId) -> Result<(), ProviderError> {
        let mut browser = self.lock();
        if browser.windows.remove(&id).is_none() {
            return Err(ProviderError::NotFound(StaleRef::Window(id)));
        }
        browser.tabs.retain(|tab| tab.window_id != id);
        if browser.current == Some(id) {
            browser.current = browser.windows.keys().next_back().copied();
        }
        browser.emit(BrowserEvent::WindowRemoved(id));
        Ok(())
    }

    async fn get_all_windows(&self) -> Result<Vec<Window>, ProviderError> {
        Ok(self.lock().windows.values().cloned().collect())
    }

    async fn get_current_window(&self) -> Result<Window, ProviderError> {
        let browser = self.lock();
        browser
            .current
            .and_then(|id| browser.windows.get(&id).cloned())
            .ok_or_else(|| ProviderError::call("getCurrentWindow", "no window is open"))
    }
}
