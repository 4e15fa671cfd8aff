//! The engine a host constructs: components wired over one store and one
//! browser, plus event dispatch.
//!
//! ```text
//!   host events ──▶ dispatch ──▶ reconciler / carry-over / new-window flow
//!   popup calls ──▶ SyncEngine ──▶ registry / orchestrator / carry-over
//! ```
//!
//! Every event is handled on its own task. A handler that fails logs the
//! error and ends; it never takes the dispatcher down with it.

use std::collections::HashSet;
use std::sync::Arc;

use tabsync_protocol::{keys, InboundMessage, Tab, TabId, TabQuery, WindowId};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::bindings::{BindingTable, Bindings};
use crate::carry_over::{CarryOverEntries, CarryOverSet, CarryOverToggle};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::events::BrowserEvent;
use crate::new_window::NewWindowFlow;
use crate::orchestrator::{PendingSwitch, SwitchOrchestrator, SwitchOutcome, SwitchRequest};
use crate::provider::TabProvider;
use crate::reconciler::TabReconciler;
use crate::registry::{ProjectRegistry, ProjectTabs};
use crate::store::{KeyValueStore, StoreClient};

struct EngineInner {
    provider: Arc<dyn TabProvider>,
    store: StoreClient,
    registry: ProjectRegistry,
    bindings: BindingTable,
    carry_over: CarryOverSet,
    log: EventLog,
    reconciler: TabReconciler,
    orchestrator: SwitchOrchestrator,
    new_window: NewWindowFlow,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn TabProvider>,
        backend: Arc<dyn KeyValueStore>,
        config: &SyncConfig,
    ) -> Self {
        let store = StoreClient::new(backend);
        let bindings = BindingTable::new(store.clone());
        let registry = ProjectRegistry::new(store.clone(), bindings.clone());
        let carry_over = CarryOverSet::new(store.clone(), registry.clone());
        let log = EventLog::new(store.clone(), config.event_log_capacity);

        let reconciler = TabReconciler::new(
            provider.clone(),
            registry.clone(),
            bindings.clone(),
            carry_over.clone(),
            log.clone(),
            config.debounce(),
        );
        let orchestrator = SwitchOrchestrator::new(
            provider.clone(),
            store.clone(),
            bindings.clone(),
            carry_over.clone(),
            log.clone(),
            config.window_settle(),
        );
        let new_window = NewWindowFlow::new(
            provider.clone(),
            store.clone(),
            registry.clone(),
            bindings.clone(),
            log.clone(),
        );

        Self {
            inner: Arc::new(EngineInner {
                provider,
                store,
                registry,
                bindings,
                carry_over,
                log,
                reconciler,
                orchestrator,
                new_window,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sweeps state left behind by windows and tabs that closed while the
    /// engine was not running.
    pub async fn startup(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.store.get::<bool>(keys::INITIALIZED).await?.is_none() {
            inner.store.set(keys::INITIALIZED, &true).await?;
            inner.log.record("Extension installed").await;
        }
        inner.log.record("Extension started").await;

        inner.new_window.collect_stale_bindings().await?;

        let live: HashSet<TabId> = inner
            .provider
            .query_tabs(TabQuery::all())
            .await?
            .into_iter()
            .map(|tab| tab.id)
            .collect();
        inner.carry_over.prune_stale(&live).await?;
        Ok(())
    }

    /// Handles `event` on its own task.
    pub fn dispatch(&self, event: BrowserEvent) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let source = event.source();
            if let Err(err) = engine.handle(event).await {
                tracing::warn!(source, error = %err, "Event handler failed");
                engine
                    .inner
                    .log
                    .record(format!("Error handling {}: {}", source, err))
                    .await;
            }
        })
    }

    /// Dispatches events until the sender side closes.
    pub async fn run(&self, mut events: UnboundedReceiver<BrowserEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        tracing::debug!("Event stream closed");
    }

    async fn handle(&self, event: BrowserEvent) -> Result<()> {
        let inner = &self.inner;
        let source = event.source();
        match event {
            BrowserEvent::TabUpdated { tab_id, url } => {
                if let Some(url) = url {
                    inner.carry_over.on_url_changed(tab_id, &url).await?;
                }
                inner.reconciler.reconcile(source).await?;
            }
            BrowserEvent::TabCreated(_)
            | BrowserEvent::TabRemoved { .. }
            | BrowserEvent::TabDetached { .. }
            | BrowserEvent::TabAttached { .. } => {
                inner.reconciler.reconcile(source).await?;
            }
            BrowserEvent::WindowCreated(window) => {
                inner.new_window.on_window_created(&window).await?;
            }
            BrowserEvent::WindowRemoved(window_id) => {
                inner.bindings.unbind(window_id).await?;
                inner.store.remove(&[keys::SELECTED_PROJECT]).await?;
                inner
                    .log
                    .record(format!("Window {} removed", window_id))
                    .await;
            }
            BrowserEvent::Message(message) => self.handle_message(message).await?,
        }
        Ok(())
    }

    async fn handle_message(&self, message: InboundMessage) -> Result<()> {
        let inner = &self.inner;
        match message {
            InboundMessage::SetNewWindowProject { project } => {
                inner.store.set(keys::PROJECT_TO_OPEN, &project).await?;
            }
            InboundMessage::ClearSelectedProject => {
                inner.store.remove(&[keys::SELECTED_PROJECT]).await?;
            }
            InboundMessage::Refresh => {
                inner.reconciler.refresh().await?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn add_project(&self, name: &str) -> Result<()> {
        self.inner.registry.add_project(name).await
    }

    pub async fn delete_project(&self, name: &str) -> Result<()> {
        self.inner.registry.delete_project(name).await
    }

    pub async fn projects(&self) -> Result<Vec<String>> {
        self.inner.registry.list_projects().await
    }

    pub async fn project_tabs(&self) -> Result<ProjectTabs> {
        self.inner.registry.all_tabs().await
    }

    pub async fn active_project_for(&self, window_id: WindowId) -> Result<Option<String>> {
        self.inner.bindings.active_project_for(window_id).await
    }

    /// Project bound to the window the user is in.
    pub async fn current_project(&self) -> Result<Option<String>> {
        let window = self.inner.provider.get_current_window().await?;
        self.active_project_for(window.id).await
    }

    pub async fn bindings(&self) -> Result<Bindings> {
        self.inner.bindings.all().await
    }

    pub async fn log_entries(&self) -> Result<Vec<String>> {
        self.inner.log.entries().await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Switching
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn request_switch(&self, target: &str) -> Result<SwitchRequest> {
        self.inner.orchestrator.request_switch(target).await
    }

    pub async fn confirm(&self, accept: bool) -> Result<SwitchOutcome> {
        self.inner.orchestrator.confirm(accept).await
    }

    pub fn pending_switch(&self) -> Option<PendingSwitch> {
        self.inner.orchestrator.pending()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Carry-over
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn carry_over_entries(&self) -> Result<CarryOverEntries> {
        self.inner.carry_over.entries().await
    }

    /// Active tab of the current window, if any.
    pub async fn current_tab(&self) -> Result<Option<Tab>> {
        let window = self.inner.provider.get_current_window().await?;
        Ok(self
            .inner
            .provider
            .query_tabs(TabQuery::in_window(window.id))
            .await?
            .into_iter()
            .find(|tab| tab.active))
    }

    pub async fn mark_current_tab(&self) -> Result<Option<TabId>> {
        let Some(tab) = self.current_tab().await? else {
            return Ok(None);
        };
        self.inner.carry_over.mark(tab.id, &tab.url).await?;
        Ok(Some(tab.id))
    }

    /// Unmarks the active tab and re-records the window so its URL rejoins the
    /// project list.
    pub async fn unmark_current_tab(&self) -> Result<bool> {
        let Some(tab) = self.current_tab().await? else {
            return Ok(false);
        };
        let removed = self.inner.carry_over.unmark(tab.id).await?;
        if removed {
            self.inner.reconciler.refresh().await?;
        }
        Ok(removed)
    }

    /// Context-menu entry point.
    pub async fn toggle_current_tab(&self) -> Result<Option<CarryOverToggle>> {
        let Some(tab) = self.current_tab().await? else {
            return Ok(None);
        };
        let toggled = self.inner.carry_over.toggle(&tab).await?;
        if toggled == CarryOverToggle::Unmarked {
            self.inner.reconciler.refresh().await?;
        }
        Ok(Some(toggled))
    }
}
