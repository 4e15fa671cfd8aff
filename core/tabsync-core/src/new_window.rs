//! Populates freshly created windows.
//!
//! A switch (or the popup's "open in new window") leaves the project name under
//! `projectToOpen` and then creates a window. When the window-created event
//! arrives this flow opens the project's recorded URLs there, binds the window
//! and consumes the hand-off key. Windows created without a hand-off are left
//! alone apart from the binding sweep.

use std::sync::Arc;

use tabsync_protocol::{keys, CreateTabProps, TabQuery, Window, WindowId};

use crate::bindings::BindingTable;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::provider::TabProvider;
use crate::registry::ProjectRegistry;
use crate::store::StoreClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewWindowOutcome {
    /// No project was handed off; the window stays unbound.
    Untracked,
    Opened {
        project: String,
        window_id: WindowId,
        opened: usize,
        initial_tab_removed: bool,
    },
}

#[derive(Clone)]
pub struct NewWindowFlow {
    provider: Arc<dyn TabProvider>,
    store: StoreClient,
    registry: ProjectRegistry,
    bindings: BindingTable,
    log: EventLog,
}

impl NewWindowFlow {
    pub fn new(
        provider: Arc<dyn TabProvider>,
        store: StoreClient,
        registry: ProjectRegistry,
        bindings: BindingTable,
        log: EventLog,
    ) -> Self {
        Self {
            provider,
            store,
            registry,
            bindings,
            log,
        }
    }

    /// Drops bindings for every window that is no longer open.
    pub async fn collect_stale_bindings(&self) -> Result<Vec<WindowId>> {
        let live: Vec<WindowId> = self
            .provider
            .get_all_windows()
            .await?
            .into_iter()
            .map(|window| window.id)
            .collect();
        self.bindings.garbage_collect(&live).await
    }

    pub async fn on_window_created(&self, window: &Window) -> Result<NewWindowOutcome> {
        self.collect_stale_bindings().await?;

        let initial_tabs = self
            .provider
            .query_tabs(TabQuery::in_window(window.id))
            .await?;
        self.log
            .record(format!(
                "Window {} created with {} tabs",
                window.id,
                initial_tabs.len()
            ))
            .await;

        let Some(project) = self.store.get::<String>(keys::PROJECT_TO_OPEN).await? else {
            return Ok(NewWindowOutcome::Untracked);
        };
        self.log.record(format!("Project to open: {}", project)).await;
        self.store.set(keys::SELECTED_PROJECT, &project).await?;

        let urls = self.registry.ensure_tab_list(&project).await?;
        let mut opened = 0;
        for url in urls {
            let props = CreateTabProps {
                window_id: window.id,
                url,
            };
            match self.provider.create_tab(props).await {
                Ok(_) => opened += 1,
                Err(err) => {
                    tracing::warn!(window_id = %window.id, error = %err, "Failed to open project tab");
                }
            }
        }

        self.bindings.bind(window.id, &project).await?;
        self.store.remove(&[keys::PROJECT_TO_OPEN]).await?;

        let mut initial_tab_removed = false;
        if let Some(initial) = initial_tabs.first() {
            let current = self
                .provider
                .query_tabs(TabQuery::in_window(window.id))
                .await?;
            if current.len() > 1 {
                match self.provider.remove_tab(initial.id).await {
                    Ok(()) => initial_tab_removed = true,
                    Err(err) if err.is_stale() => {}
                    Err(err) => {
                        tracing::warn!(tab_id = %initial.id, error = %err, "Failed to remove initial tab");
                    }
                }
            }
        }

        self.log
            .record(format!(
                "Opened {} tabs for project {} in window {}",
                opened, project, window.id
            ))
            .await;
        Ok(NewWindowOutcome::Opened {
            project,
            window_id: window.id,
            opened,
            initial_tab_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedBrowser;
    use crate::store::MemoryStore;
    use tabsync_protocol::CreateWindowProps;

    struct Fixture {
        browser: Arc<SimulatedBrowser>,
        store: StoreClient,
        registry: ProjectRegistry,
        bindings: BindingTable,
        flow: NewWindowFlow,
    }

    fn fixture() -> Fixture {
        let store = StoreClient::new(Arc::new(MemoryStore::new()));
        let browser = Arc::new(SimulatedBrowser::new());
        let bindings = BindingTable::new(store.clone());
        let registry = ProjectRegistry::new(store.clone(), bindings.clone());
        let flow = NewWindowFlow::new(
            browser.clone(),
            store.clone(),
            registry.clone(),
            bindings.clone(),
            EventLog::new(store.clone(), 100),
        );
        Fixture {
            browser,
            store,
            registry,
            bindings,
            flow,
        }
    }

    #[tokio::test]
    async fn opens_recorded_urls_and_drops_blank_tab() {
        let f = fixture();
        f.registry
            .record_tabs("Work", &["https://a".to_string(), "https://b".to_string()])
            .await
            .unwrap();
        f.store.set(keys::PROJECT_TO_OPEN, "Work").await.unwrap();

        let window = f
            .browser
            .create_window(CreateWindowProps::default())
            .await
            .unwrap();
        let outcome = f.flow.on_window_created(&window).await.unwrap();

        assert_eq!(
            outcome,
            NewWindowOutcome::Opened {
                project: "Work".to_string(),
                window_id: window.id,
                opened: 2,
                initial_tab_removed: true,
            }
        );
        assert_eq!(f.browser.urls_in(window.id), vec!["https://a", "https://b"]);
        assert_eq!(
            f.bindings.active_project_for(window.id).await.unwrap(),
            Some("Work".to_string())
        );
        assert_eq!(f.store.get::<String>(keys::PROJECT_TO_OPEN).await.unwrap(), None);
        assert_eq!(
            f.store.get::<String>(keys::SELECTED_PROJECT).await.unwrap(),
            Some("Work".to_string())
        );
    }

    #[tokio::test]
    async fn empty_project_keeps_initial_tab() {
        let f = fixture();
        f.store.set(keys::PROJECT_TO_OPEN, "Fresh").await.unwrap();

        let window = f
            .browser
            .create_window(CreateWindowProps::default())
            .await
            .unwrap();
        f.flow.on_window_created(&window).await.unwrap();

        assert_eq!(f.browser.tabs_in(window.id).len(), 1);
        assert!(f.registry.all_tabs().await.unwrap().contains_key("Fresh"));
        assert_eq!(
            f.bindings.active_project_for(window.id).await.unwrap(),
            Some("Fresh".to_string())
        );
    }

    #[tokio::test]
    async fn window_without_hand_off_is_untracked() {
        let f = fixture();
        let window = f
            .browser
            .create_window(CreateWindowProps::default())
            .await
            .unwrap();
        assert_eq!(
            f.flow.on_window_created(&window).await.unwrap(),
            NewWindowOutcome::Untracked
        );
        assert_eq!(f.bindings.active_project_for(window.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_bindings_are_swept_on_creation() {
        let f = fixture();
        f.bindings.bind(WindowId(999), "Ghost").await.unwrap();

        let window = f
            .browser
            .create_window(CreateWindowProps::default())
            .await
            .unwrap();
        f.flow.on_window_created(&window).await.unwrap();

        assert!(f.bindings.all().await.unwrap().is_empty());
    }
}
