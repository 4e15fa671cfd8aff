//! Project switch orchestration.
//!
//! Switching moves the user into a fresh window for the target project. The
//! flow is a two-step state machine owned by one [`SwitchOrchestrator`]:
//!
//! ```text
//! Idle ──request_switch──▶ AwaitingConfirmation ──confirm(true)──▶ Migrating ──▶ Idle
//!                                   │
//!                                   └──────────confirm(false)─────────▶ Idle
//! ```
//!
//! Only one switch is admitted at a time. Migration:
//!
//! 1. Hand the target to the new-window flow via `projectToOpen`, then clear
//!    the source window's binding and the `selectedProject` marker so the
//!    reconciler stops recording the source window.
//! 2. Create a window shaped like the source (maximized, or same size).
//! 3. Wait for the window to settle.
//! 4. Move carry-over tabs into the new window one by one, re-keying each
//!    entry under the id the tab comes back with.
//! 5. Close every other source tab, then the source window once it is empty.
//! 6. Bind the new window to the target.
//!
//! A tab that fails to move or close is logged and skipped; the switch still
//! completes and binds the new window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tabsync_protocol::{keys, CreateWindowProps, MoveTarget, TabId, TabQuery, Window, WindowId};

use crate::bindings::BindingTable;
use crate::carry_over::CarryOverSet;
use crate::error::{ProviderError, Result, SyncError};
use crate::event_log::EventLog;
use crate::provider::TabProvider;
use crate::store::StoreClient;

/// A switch captured by `request_switch`, waiting for the user to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwitch {
    pub target: String,
    /// Snapshot of the requesting window, used to shape the new one.
    pub source: Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchRequest {
    /// The requesting window is already on the target project.
    Unchanged,
    AwaitingConfirmation(PendingSwitch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Aborted,
    Completed(SwitchReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchReport {
    pub project: String,
    pub new_window: WindowId,
    /// Source window's active tab when migration started. It closes with the
    /// rest unless it was marked for carry over.
    pub active_tab: Option<TabId>,
    pub moved: usize,
    pub removed: usize,
    /// Tabs left behind in the source window after a failed move or close.
    pub failed: Vec<TabId>,
    pub source_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SwitchPhase {
    Idle,
    AwaitingConfirmation(PendingSwitch),
    Migrating,
}

/// Returns the orchestrator to `Idle` however migration ends, including when
/// the confirming task is dropped mid-flight.
struct ResetOnDrop<'a>(&'a Mutex<SwitchPhase>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut phase = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *phase = SwitchPhase::Idle;
    }
}

pub struct SwitchOrchestrator {
    provider: Arc<dyn TabProvider>,
    store: StoreClient,
    bindings: BindingTable,
    carry_over: CarryOverSet,
    log: EventLog,
    settle: Duration,
    phase: Mutex<SwitchPhase>,
}

impl SwitchOrchestrator {
    pub fn new(
        provider: Arc<dyn TabProvider>,
        store: StoreClient,
        bindings: BindingTable,
        carry_over: CarryOverSet,
        log: EventLog,
        settle: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            bindings,
            carry_over,
            log,
            settle,
            phase: Mutex::new(SwitchPhase::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitchPhase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending(&self) -> Option<PendingSwitch> {
        match &*self.lock() {
            SwitchPhase::AwaitingConfirmation(pending) => Some(pending.clone()),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.lock() == SwitchPhase::Idle
    }

    /// Captures a switch of the current window to `target`.
    pub async fn request_switch(&self, target: &str) -> Result<SwitchRequest> {
        if !self.is_idle() {
            return Err(SyncError::SwitchInProgress);
        }

        let source = self.provider.get_current_window().await?;
        let active = self.bindings.active_project_for(source.id).await?;
        if active.as_deref() == Some(target) {
            tracing::debug!(project = target, window_id = %source.id, "Already on requested project");
            return Ok(SwitchRequest::Unchanged);
        }

        let pending = PendingSwitch {
            target: target.to_string(),
            source,
        };
        {
            let mut phase = self.lock();
            if *phase != SwitchPhase::Idle {
                return Err(SyncError::SwitchInProgress);
            }
            *phase = SwitchPhase::AwaitingConfirmation(pending.clone());
        }
        tracing::info!(project = target, window_id = %pending.source.id, "Switch awaiting confirmation");
        Ok(SwitchRequest::AwaitingConfirmation(pending))
    }

    /// Resolves the pending switch. `accept == false` is the only way to
    /// cancel; once migration starts it runs to completion.
    pub async fn confirm(&self, accept: bool) -> Result<SwitchOutcome> {
        let pending = {
            let mut phase = self.lock();
            match std::mem::replace(&mut *phase, SwitchPhase::Idle) {
                SwitchPhase::AwaitingConfirmation(pending) => {
                    if accept {
                        *phase = SwitchPhase::Migrating;
                    }
                    pending
                }
                SwitchPhase::Idle => return Err(SyncError::NoPendingSwitch),
                SwitchPhase::Migrating => {
                    *phase = SwitchPhase::Migrating;
                    return Err(SyncError::SwitchInProgress);
                }
            }
        };

        if !accept {
            self.log
                .record(format!("Switch to project {} cancelled", pending.target))
                .await;
            return Ok(SwitchOutcome::Aborted);
        }

        let _reset = ResetOnDrop(&self.phase);
        let report = self.migrate(&pending).await.map_err(|err| {
            tracing::warn!(project = %pending.target, error = %err, "Project switch failed");
            err
        })?;
        Ok(SwitchOutcome::Completed(report))
    }

    async fn migrate(&self, pending: &PendingSwitch) -> Result<SwitchReport> {
        let target = pending.target.as_str();
        let source = &pending.source;

        self.store.set(keys::PROJECT_TO_OPEN, target).await?;
        self.bindings.unbind(source.id).await?;
        self.store.remove(&[keys::SELECTED_PROJECT]).await?;

        let new_window = match self
            .provider
            .create_window(CreateWindowProps::replicating(source))
            .await
        {
            Ok(window) => window,
            Err(err) => {
                self.store.remove(&[keys::PROJECT_TO_OPEN]).await?;
                self.log
                    .record(format!("Failed to create window for project {}: {}", target, err))
                    .await;
                return Err(err.into());
            }
        };
        self.log
            .record(format!(
                "Opened window {} for project {}",
                new_window.id, target
            ))
            .await;

        tokio::time::sleep(self.settle).await;

        let mut report = SwitchReport {
            project: target.to_string(),
            new_window: new_window.id,
            active_tab: None,
            moved: 0,
            removed: 0,
            failed: Vec::new(),
            source_closed: false,
        };
        self.migrate_tabs(source.id, new_window.id, &mut report).await;

        report.source_closed = self.close_if_empty(source.id).await;
        // Bound even after partial failures so the new window never ends up
        // without a project.
        self.bindings.bind(new_window.id, target).await?;

        self.log
            .record(format!(
                "Switched to project {} in window {} ({} carried over, {} closed, {} failed)",
                target,
                new_window.id,
                report.moved,
                report.removed,
                report.failed.len()
            ))
            .await;
        Ok(report)
    }

    /// Moves carry-over tabs from `source` into `target` and closes the rest.
    /// Failures are logged and recorded in `report`; nothing here aborts the
    /// switch.
    async fn migrate_tabs(&self, source: WindowId, target: WindowId, report: &mut SwitchReport) {
        let tabs = match self.provider.query_tabs(TabQuery::in_window(source)).await {
            Ok(tabs) => tabs,
            Err(err) => {
                self.log
                    .record(format!("Failed to list tabs of window {}: {}", source, err))
                    .await;
                return;
            }
        };
        // Without the carry-over set there is no telling which tabs must
        // survive, so the source window is left untouched.
        let carry_over = match self.carry_over.entries().await {
            Ok(entries) => entries,
            Err(err) => {
                self.log
                    .record(format!("Failed to read carry-over tabs: {}", err))
                    .await;
                return;
            }
        };

        report.active_tab = tabs.iter().find(|tab| tab.active).map(|tab| tab.id);
        let (carried, remaining): (Vec<_>, Vec<_>) = tabs
            .into_iter()
            .partition(|tab| carry_over.contains_key(&tab.id));

        for tab in &carried {
            let moved = match self
                .provider
                .move_tabs(&[tab.id], MoveTarget::end_of(target))
                .await
            {
                Ok(moved) => moved,
                Err(err) => {
                    self.skip_tab(tab.id, "move", &err, report).await;
                    continue;
                }
            };
            let url = carry_over.get(&tab.id).unwrap_or(&tab.url);
            let new_id = moved.first().map_or(tab.id, |moved| moved.id);
            match self.carry_over.rekey(tab.id, new_id, url).await {
                Ok(()) => report.moved += 1,
                Err(err) => {
                    report.failed.push(tab.id);
                    self.log
                        .record(format!(
                            "Moved tab {} as {} but failed to re-key it: {}",
                            tab.id, new_id, err
                        ))
                        .await;
                }
            }
        }

        for tab in &remaining {
            match self.provider.remove_tab(tab.id).await {
                Ok(()) => report.removed += 1,
                Err(err) => self.skip_tab(tab.id, "close", &err, report).await,
            }
        }
    }

    async fn skip_tab(
        &self,
        tab_id: TabId,
        action: &str,
        err: &ProviderError,
        report: &mut SwitchReport,
    ) {
        if err.is_stale() {
            tracing::debug!(tab_id = %tab_id, action, "Tab already gone");
            return;
        }
        report.failed.push(tab_id);
        self.log
            .record(format!("Failed to {} tab {}: {}", action, tab_id, err))
            .await;
    }

    async fn close_if_empty(&self, window_id: WindowId) -> bool {
        match self.provider.query_tabs(TabQuery::in_window(window_id)).await {
            Ok(tabs) if tabs.is_empty() => {}
            Ok(_) => return false,
            Err(err) => {
                tracing::warn!(window_id = %window_id, error = %err, "Failed to inspect source window");
                return false;
            }
        }
        match self.provider.remove_window(window_id).await {
            Ok(()) => true,
            Err(err) if err.is_stale() => true,
            Err(err) => {
                self.log
                    .record(format!("Failed to close window {}: {}", window_id, err))
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::result::Result;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tabsync_protocol::{CreateTabProps, Tab, WindowState};

    use crate::error::StoreError;
    use crate::provider::SimulatedBrowser;
    use crate::registry::ProjectRegistry;
    use crate::store::{KeyValueStore, MemoryStore, StoreMap};

    struct Fixture {
        browser: Arc<SimulatedBrowser>,
        store: StoreClient,
        bindings: BindingTable,
        carry_over: CarryOverSet,
        orchestrator: SwitchOrchestrator,
    }

    fn fixture() -> Fixture {
        let browser = Arc::new(SimulatedBrowser::new());
        fixture_with(browser.clone(), browser, Arc::new(MemoryStore::new()))
    }

    fn fixture_with(
        browser: Arc<SimulatedBrowser>,
        provider: Arc<dyn TabProvider>,
        backend: Arc<dyn KeyValueStore>,
    ) -> Fixture {
        let store = StoreClient::new(backend);
        let bindings = BindingTable::new(store.clone());
        let registry = ProjectRegistry::new(store.clone(), bindings.clone());
        let carry_over = CarryOverSet::new(store.clone(), registry);
        let orchestrator = SwitchOrchestrator::new(
            provider,
            store.clone(),
            bindings.clone(),
            carry_over.clone(),
            EventLog::new(store.clone(), 100),
            Duration::from_millis(1000),
        );
        Fixture {
            browser,
            store,
            bindings,
            carry_over,
            orchestrator,
        }
    }

    /// Browser whose tab listing fails for one window.
    struct UnlistableWindow {
        inner: Arc<SimulatedBrowser>,
        window_id: WindowId,
    }

    #[async_trait]
    impl TabProvider for UnlistableWindow {
        async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, ProviderError> {
            if query.window_id == Some(self.window_id) {
                return Err(ProviderError::call("queryTabs", "window is busy"));
            }
            self.inner.query_tabs(query).await
        }

        async fn create_tab(&self, props: CreateTabProps) -> Result<Tab, ProviderError> {
            self.inner.create_tab(props).await
        }

        async fn remove_tabs(&self, ids: &[TabId]) -> Result<(), ProviderError> {
            self.inner.remove_tabs(ids).await
        }

        async fn move_tabs(
            &self,
            ids: &[TabId],
            target: MoveTarget,
        ) -> Result<Vec<Tab>, ProviderError> {
            self.inner.move_tabs(ids, target).await
        }

        async fn create_window(&self, props: CreateWindowProps) -> Result<Window, ProviderError> {
            self.inner.create_window(props).await
        }

        async fn remove_window(&self, id: WindowId) -> Result<(), ProviderError> {
            self.inner.remove_window(id).await
        }

        async fn get_all_windows(&self) -> Result<Vec<Window>, ProviderError> {
            self.inner.get_all_windows().await
        }

        async fn get_current_window(&self) -> Result<Window, ProviderError> {
            self.inner.get_current_window().await
        }
    }

    /// Memory store that refuses carry-over writes once `reject` is set.
    #[derive(Default)]
    struct ReadOnlyCarryOver {
        inner: MemoryStore,
        reject: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for ReadOnlyCarryOver {
        async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
            self.inner.get(keys).await
        }

        async fn set(&self, items: StoreMap) -> Result<(), StoreError> {
            if self.reject.load(Ordering::SeqCst) && items.contains_key(keys::CARRY_OVER_TABS) {
                return Err(StoreError::Backend("carry-over is read-only".to_string()));
            }
            self.inner.set(items).await
        }

        async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
            self.inner.remove(keys).await
        }

        async fn get_all(&self) -> Result<StoreMap, StoreError> {
            self.inner.get_all().await
        }
    }

    fn completed(outcome: SwitchOutcome) -> SwitchReport {
        match outcome {
            SwitchOutcome::Completed(report) => report,
            SwitchOutcome::Aborted => panic!("switch was aborted"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_for_active_project_is_noop() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a"]);
        f.bindings.bind(window.id, "Work").await.unwrap();

        assert_eq!(
            f.orchestrator.request_switch("Work").await.unwrap(),
            SwitchRequest::Unchanged
        );
        assert!(f.orchestrator.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_is_rejected_while_pending() {
        let f = fixture();
        f.browser.open_window(&["https://a"]);

        f.orchestrator.request_switch("Work").await.unwrap();
        let err = f.orchestrator.request_switch("Home").await.unwrap_err();
        assert!(matches!(err, SyncError::SwitchInProgress));
        assert_eq!(f.orchestrator.pending().unwrap().target, "Work");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_returns_to_idle_without_touching_windows() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a"]);
        f.bindings.bind(window.id, "Home").await.unwrap();

        f.orchestrator.request_switch("Work").await.unwrap();
        assert_eq!(
            f.orchestrator.confirm(false).await.unwrap(),
            SwitchOutcome::Aborted
        );

        assert!(f.orchestrator.is_idle());
        assert_eq!(f.browser.window_ids(), vec![window.id]);
        assert_eq!(
            f.bindings.active_project_for(window.id).await.unwrap(),
            Some("Home".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_without_request_fails() {
        let f = fixture();
        let err = f.orchestrator.confirm(true).await.unwrap_err();
        assert!(matches!(err, SyncError::NoPendingSwitch));
    }

    #[tokio::test(start_paused = true)]
    async fn switch_moves_carry_over_and_closes_source() {
        let f = fixture();
        let source = f.browser.open_window(&["https://a", "https://docs", "https://b"]);
        f.bindings.bind(source.id, "Home").await.unwrap();
        let source_tabs = f.browser.tabs_in(source.id);
        let docs = source_tabs[1].clone();
        f.carry_over.mark(docs.id, &docs.url).await.unwrap();

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        assert_eq!(report.active_tab, Some(source_tabs[0].id));
        assert_eq!(report.moved, 1);
        assert_eq!(report.removed, 2);
        assert!(report.failed.is_empty());
        assert!(report.source_closed);
        assert!(f.browser.window(source.id).is_none());
        assert!(f.orchestrator.is_idle());

        assert_eq!(
            f.bindings.active_project_for(report.new_window).await.unwrap(),
            Some("Work".to_string())
        );
        assert_eq!(f.bindings.active_project_for(source.id).await.unwrap(), None);
        assert_eq!(
            f.store.get::<String>(keys::PROJECT_TO_OPEN).await.unwrap(),
            Some("Work".to_string())
        );

        let moved = f
            .browser
            .tabs_in(report.new_window)
            .into_iter()
            .find(|tab| tab.url == "https://docs")
            .unwrap();
        assert_ne!(moved.id, docs.id);
        let entries = f.carry_over.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&moved.id), Some(&"https://docs".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_move_keeps_entry_and_source_window() {
        let f = fixture();
        let source = f.browser.open_window(&["https://a", "https://x"]);
        let x = f.browser.tabs_in(source.id)[1].clone();
        f.carry_over.mark(x.id, &x.url).await.unwrap();
        f.browser.fail_moves_for(x.id);

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        assert_eq!(report.moved, 0);
        assert_eq!(report.failed, vec![x.id]);
        assert!(!report.source_closed);
        assert_eq!(f.browser.urls_in(source.id), vec!["https://x"]);

        let entries = f.carry_over.entries().await.unwrap();
        assert_eq!(entries.get(&x.id), Some(&"https://x".to_string()));
        assert_eq!(
            f.bindings.active_project_for(report.new_window).await.unwrap(),
            Some("Work".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_close_is_reported_and_window_still_bound() {
        let f = fixture();
        let source = f
            .browser
            .open_window(&["https://a", "https://pinned", "https://docs"]);
        let tabs = f.browser.tabs_in(source.id);
        let (pinned, docs) = (tabs[1].clone(), tabs[2].clone());
        f.carry_over.mark(docs.id, &docs.url).await.unwrap();
        f.browser.fail_removes_for(pinned.id);

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        assert_eq!(report.moved, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, vec![pinned.id]);
        assert!(!report.source_closed);
        assert_eq!(f.browser.urls_in(source.id), vec!["https://pinned"]);
        assert_eq!(
            f.bindings.active_project_for(report.new_window).await.unwrap(),
            Some("Work".to_string())
        );
        assert!(f.orchestrator.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn unlistable_source_still_binds_new_window() {
        let browser = Arc::new(SimulatedBrowser::new());
        let source = browser.open_window(&["https://a", "https://b"]);
        let provider = Arc::new(UnlistableWindow {
            inner: browser.clone(),
            window_id: source.id,
        });
        let f = fixture_with(browser, provider, Arc::new(MemoryStore::new()));

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        assert_eq!(report.active_tab, None);
        assert_eq!((report.moved, report.removed), (0, 0));
        assert!(!report.source_closed);
        assert_eq!(f.browser.urls_in(source.id), vec!["https://a", "https://b"]);
        assert_eq!(
            f.bindings.active_project_for(report.new_window).await.unwrap(),
            Some("Work".to_string())
        );
        assert!(f.orchestrator.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rekey_is_reported_and_window_still_bound() {
        let browser = Arc::new(SimulatedBrowser::new());
        let backend = Arc::new(ReadOnlyCarryOver::default());
        let f = fixture_with(browser.clone(), browser, backend.clone());
        let source = f.browser.open_window(&["https://a", "https://docs"]);
        let docs = f.browser.tabs_in(source.id)[1].clone();
        f.carry_over.mark(docs.id, &docs.url).await.unwrap();
        backend.reject.store(true, Ordering::SeqCst);

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        assert_eq!(report.moved, 0);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, vec![docs.id]);
        assert!(f
            .browser
            .urls_in(report.new_window)
            .contains(&"https://docs".to_string()));
        assert!(f.carry_over.is_marked(docs.id).await.unwrap());
        assert_eq!(
            f.bindings.active_project_for(report.new_window).await.unwrap(),
            Some("Work".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn maximized_source_yields_maximized_window() {
        let f = fixture();
        f.browser
            .open_window_shaped(Some(1920), Some(1080), WindowState::Maximized, &["https://a"]);

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        let window = f.browser.window(report.new_window).unwrap();
        assert_eq!(window.state, WindowState::Maximized);
        assert_eq!(window.width, None);
        assert_eq!(window.height, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sized_source_is_replicated() {
        let f = fixture();
        f.browser
            .open_window_shaped(Some(900), Some(700), WindowState::Normal, &["https://a"]);

        f.orchestrator.request_switch("Work").await.unwrap();
        let report = completed(f.orchestrator.confirm(true).await.unwrap());

        let window = f.browser.window(report.new_window).unwrap();
        assert_eq!((window.width, window.height), (Some(900), Some(700)));
        assert_eq!(window.state, WindowState::Normal);
    }
}
