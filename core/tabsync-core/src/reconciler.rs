//! Tab change reconciler.
//!
//! Keeps the focused window's project tab list in step with the live tabs.
//! Every tab lifecycle event triggers a pass:
//!
//! 1. Resolve the current window and the project bound to it; unbound windows
//!    are ignored.
//! 2. Collect the window's tab URLs, skipping blank tabs and carry-over URLs.
//! 3. Growing or unchanged lists are written immediately. A list shorter than
//!    the last recorded one is held back for the debounce delay, then re-read
//!    from the live window and written, so a burst of closes (or a window
//!    closing tab by tab) collapses into one write.
//!
//! Each pass takes a fresh generation number for its project. A deferred write
//! only lands if no later pass for the same project started in the meantime,
//! so within a burst only the last write survives.
//!
//! Passes are not serialized against each other; the last writer wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tabsync_protocol::{TabQuery, WindowId};

use crate::bindings::BindingTable;
use crate::carry_over::CarryOverSet;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::provider::TabProvider;
use crate::registry::ProjectRegistry;

/// What a single reconcile pass ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The current window has no project.
    Unbound,
    Recorded { project: String, tab_count: usize },
    /// A later pass for the same project took over during the debounce delay.
    Superseded,
}

#[derive(Default)]
struct ReconcileState {
    /// Tab count last written per project. Reset on restart.
    recorded_lengths: HashMap<String, usize>,
    generations: HashMap<String, u64>,
}

pub struct TabReconciler {
    provider: Arc<dyn TabProvider>,
    registry: ProjectRegistry,
    bindings: BindingTable,
    carry_over: CarryOverSet,
    log: EventLog,
    debounce: Duration,
    state: Mutex<ReconcileState>,
}

impl TabReconciler {
    pub fn new(
        provider: Arc<dyn TabProvider>,
        registry: ProjectRegistry,
        bindings: BindingTable,
        carry_over: CarryOverSet,
        log: EventLog,
        debounce: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            bindings,
            carry_over,
            log,
            debounce,
            state: Mutex::new(ReconcileState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReconcileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs one pass. `source` names the triggering event for the log.
    pub async fn reconcile(&self, source: &str) -> Result<ReconcileOutcome> {
        tracing::debug!(source, "Reconciling project tabs");

        let window = self.provider.get_current_window().await?;
        let Some(project) = self.bindings.active_project_for(window.id).await? else {
            return Ok(ReconcileOutcome::Unbound);
        };

        let mut urls = self.candidate_urls(window.id).await?;
        self.log
            .record(format!(
                "Found {} tabs in window {} ({})",
                urls.len(),
                window.id,
                source
            ))
            .await;

        let (generation, previous) = {
            let mut state = self.lock();
            let generation = state.generations.entry(project.clone()).or_insert(0);
            *generation += 1;
            (*generation, state.recorded_lengths.get(&project).copied())
        };

        if previous.is_some_and(|previous| urls.len() < previous) {
            tracing::debug!(
                project = %project,
                previous = previous.unwrap_or_default(),
                current = urls.len(),
                "Tab list shrank; deferring write"
            );
            tokio::time::sleep(self.debounce).await;

            if self.lock().generations.get(&project) != Some(&generation) {
                return Ok(ReconcileOutcome::Superseded);
            }
            // A window that closed during the delay has already been unbound;
            // its teardown must not wipe the project's list.
            if self.bindings.active_project_for(window.id).await?.as_deref()
                != Some(project.as_str())
            {
                return Ok(ReconcileOutcome::Unbound);
            }
            urls = self.candidate_urls(window.id).await?;
        }

        self.registry.record_tabs(&project, &urls).await?;
        self.lock()
            .recorded_lengths
            .insert(project.clone(), urls.len());
        self.log
            .record(format!(
                "Updated tabs for project {} in window {} with tabs {}",
                project,
                window.id,
                urls.join(", ")
            ))
            .await;

        Ok(ReconcileOutcome::Recorded {
            project,
            tab_count: urls.len(),
        })
    }

    pub async fn refresh(&self) -> Result<ReconcileOutcome> {
        self.reconcile("refresh").await
    }

    async fn candidate_urls(&self, window_id: WindowId) -> Result<Vec<String>> {
        let carry_over = self.carry_over.urls().await?;
        let tabs = self
            .provider
            .query_tabs(TabQuery::in_window(window_id))
            .await?;
        Ok(tabs
            .into_iter()
            .map(|tab| tab.url)
            .filter(|url| !url.trim().is_empty() && !carry_over.contains(url))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedBrowser;
    use crate::store::{MemoryStore, StoreClient};
    use tabsync_protocol::TabId;

    struct Fixture {
        browser: Arc<SimulatedBrowser>,
        registry: ProjectRegistry,
        bindings: BindingTable,
        carry_over: CarryOverSet,
        reconciler: Arc<TabReconciler>,
    }

    fn fixture() -> Fixture {
        let store = StoreClient::new(Arc::new(MemoryStore::new()));
        let browser = Arc::new(SimulatedBrowser::new());
        let bindings = BindingTable::new(store.clone());
        let registry = ProjectRegistry::new(store.clone(), bindings.clone());
        let carry_over = CarryOverSet::new(store.clone(), registry.clone());
        let log = EventLog::new(store, 100);
        let reconciler = Arc::new(TabReconciler::new(
            browser.clone(),
            registry.clone(),
            bindings.clone(),
            carry_over.clone(),
            log,
            Duration::from_millis(2000),
        ));
        Fixture {
            browser,
            registry,
            bindings,
            carry_over,
            reconciler,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unbound_window_is_ignored() {
        let f = fixture();
        f.browser.open_window(&["https://a"]);
        assert_eq!(
            f.reconciler.refresh().await.unwrap(),
            ReconcileOutcome::Unbound
        );
        assert!(f.registry.all_tabs().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn growing_list_is_written_immediately() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a", "", "https://b"]);
        f.bindings.bind(window.id, "Work").await.unwrap();

        let outcome = f.reconciler.refresh().await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                project: "Work".to_string(),
                tab_count: 2
            }
        );
        assert_eq!(
            f.registry.get_tabs("Work").await.unwrap(),
            vec!["https://a", "https://b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_closes_persist_only_the_final_state() {
        let f = fixture();
        let urls = ["https://1", "https://2", "https://3", "https://4", "https://5"];
        let window = f.browser.open_window(&urls);
        f.bindings.bind(window.id, "Work").await.unwrap();
        f.reconciler.refresh().await.unwrap();
        assert_eq!(f.registry.get_tabs("Work").await.unwrap().len(), 5);

        let ids: Vec<TabId> = f.browser.tabs_in(window.id).iter().map(|t| t.id).collect();
        let mut passes = Vec::new();
        for id in &ids[..3] {
            f.browser.close_tab(*id);
            let reconciler = f.reconciler.clone();
            passes.push(tokio::spawn(async move {
                reconciler.reconcile("tabs.onRemoved").await
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // Still inside the debounce window: nothing written yet.
        assert_eq!(f.registry.get_tabs("Work").await.unwrap().len(), 5);

        let mut outcomes = Vec::new();
        for pass in passes {
            outcomes.push(pass.await.unwrap().unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                ReconcileOutcome::Superseded,
                ReconcileOutcome::Superseded,
                ReconcileOutcome::Recorded {
                    project: "Work".to_string(),
                    tab_count: 2
                },
            ]
        );
        assert_eq!(
            f.registry.get_tabs("Work").await.unwrap(),
            vec!["https://4", "https://5"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_write_supersedes_pending_shrink() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a", "https://b"]);
        f.bindings.bind(window.id, "Work").await.unwrap();
        f.reconciler.refresh().await.unwrap();

        let first = f.browser.tabs_in(window.id)[0].id;
        f.browser.close_tab(first);
        let reconciler = f.reconciler.clone();
        let shrink = tokio::spawn(async move { reconciler.reconcile("tabs.onRemoved").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.browser.open_tab(window.id, "https://c");
        f.browser.open_tab(window.id, "https://d");
        f.reconciler.reconcile("tabs.onCreated").await.unwrap();

        assert_eq!(shrink.await.unwrap().unwrap(), ReconcileOutcome::Superseded);
        assert_eq!(
            f.registry.get_tabs("Work").await.unwrap(),
            vec!["https://b", "https://c", "https://d"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_unbound_during_delay_keeps_recorded_list() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a", "https://b"]);
        f.bindings.bind(window.id, "Work").await.unwrap();
        f.reconciler.refresh().await.unwrap();

        let first = f.browser.tabs_in(window.id)[0].id;
        f.browser.close_tab(first);
        let reconciler = f.reconciler.clone();
        let shrink = tokio::spawn(async move { reconciler.reconcile("tabs.onRemoved").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.bindings.unbind(window.id).await.unwrap();

        assert_eq!(shrink.await.unwrap().unwrap(), ReconcileOutcome::Unbound);
        assert_eq!(f.registry.get_tabs("Work").await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn carry_over_urls_are_excluded_until_unmarked() {
        let f = fixture();
        let window = f.browser.open_window(&["https://a", "https://docs"]);
        f.bindings.bind(window.id, "Work").await.unwrap();
        let docs = f.browser.tabs_in(window.id)[1].clone();

        f.carry_over.mark(docs.id, &docs.url).await.unwrap();
        f.reconciler.refresh().await.unwrap();
        assert_eq!(f.registry.get_tabs("Work").await.unwrap(), vec!["https://a"]);

        f.carry_over.unmark(docs.id).await.unwrap();
        f.reconciler.refresh().await.unwrap();
        assert_eq!(
            f.registry.get_tabs("Work").await.unwrap(),
            vec!["https://a", "https://docs"]
        );
    }
}
