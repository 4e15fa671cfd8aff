//! Window → active project bindings.
//!
//! In-process the table is a `BTreeMap<WindowId, String>`; on disk it flattens
//! to one `selectedProject_<windowId>` key per window so each binding is
//! written atomically on its own.
//!
//! Window ids are only valid while the window is open. A window-removed event
//! is not guaranteed to be observed (the process may not have been running), so
//! stale bindings are swept by [`BindingTable::garbage_collect`] whenever the
//! full set of open windows is known: on startup and on every window creation.

use std::collections::{BTreeMap, HashSet};

use tabsync_protocol::{keys, WindowId};

use crate::error::Result;
use crate::store::StoreClient;

pub type Bindings = BTreeMap<WindowId, String>;

#[derive(Clone)]
pub struct BindingTable {
    store: StoreClient,
}

impl BindingTable {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Sets the active project for `window_id`, replacing any prior binding.
    /// Several windows may be bound to the same project.
    pub async fn bind(&self, window_id: WindowId, project: &str) -> Result<()> {
        self.store
            .set(&keys::selected_project(window_id), project)
            .await?;
        tracing::debug!(window_id = %window_id, project, "Window bound to project");
        Ok(())
    }

    pub async fn unbind(&self, window_id: WindowId) -> Result<()> {
        let key = keys::selected_project(window_id);
        self.store.remove(&[key.as_str()]).await?;
        Ok(())
    }

    pub async fn active_project_for(&self, window_id: WindowId) -> Result<Option<String>> {
        Ok(self
            .store
            .get::<String>(&keys::selected_project(window_id))
            .await?)
    }

    pub async fn all(&self) -> Result<Bindings> {
        let entries = self.store.get_all().await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                let window_id = keys::parse_selected_project(&key)?;
                let project = value.as_str()?.to_string();
                Some((window_id, project))
            })
            .collect())
    }

    /// Removes every binding whose window is not in `live`. Returns the windows
    /// whose bindings were dropped.
    pub async fn garbage_collect(&self, live: &[WindowId]) -> Result<Vec<WindowId>> {
        let live: HashSet<WindowId> = live.iter().copied().collect();
        let stale: Vec<WindowId> = self
            .all()
            .await?
            .into_keys()
            .filter(|window_id| !live.contains(window_id))
            .collect();
        self.remove_all(&stale).await?;
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), "Dropped bindings for closed windows");
        }
        Ok(stale)
    }

    /// Clears every binding to `project`. Returns the windows that were unbound.
    pub async fn unbind_project(&self, project: &str) -> Result<Vec<WindowId>> {
        let bound: Vec<WindowId> = self
            .all()
            .await?
            .into_iter()
            .filter(|(_, name)| name == project)
            .map(|(window_id, _)| window_id)
            .collect();
        self.remove_all(&bound).await?;
        Ok(bound)
    }

    async fn remove_all(&self, windows: &[WindowId]) -> Result<()> {
        if windows.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = windows.iter().map(|id| keys::selected_project(*id)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.store.remove(&key_refs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn table() -> BindingTable {
        BindingTable::new(StoreClient::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn bind_overwrites_prior_binding() {
        let table = table();
        table.bind(WindowId(1), "A").await.unwrap();
        table.bind(WindowId(1), "B").await.unwrap();
        assert_eq!(
            table.active_project_for(WindowId(1)).await.unwrap(),
            Some("B".to_string())
        );
    }

    #[tokio::test]
    async fn unbind_absent_window_is_noop() {
        let table = table();
        table.unbind(WindowId(9)).await.unwrap();
        assert_eq!(table.active_project_for(WindowId(9)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_collect_keeps_only_live_windows() {
        let table = table();
        table.bind(WindowId(1), "A").await.unwrap();
        table.bind(WindowId(2), "B").await.unwrap();

        let removed = table.garbage_collect(&[WindowId(1)]).await.unwrap();
        assert_eq!(removed, vec![WindowId(2)]);

        let mut expected = Bindings::new();
        expected.insert(WindowId(1), "A".to_string());
        assert_eq!(table.all().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn two_windows_may_share_a_project() {
        let table = table();
        table.bind(WindowId(1), "A").await.unwrap();
        table.bind(WindowId(2), "A").await.unwrap();
        assert_eq!(table.all().await.unwrap().len(), 2);

        let unbound = table.unbind_project("A").await.unwrap();
        assert_eq!(unbound, vec![WindowId(1), WindowId(2)]);
        assert!(table.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_ignores_unrelated_keys() {
        let store = StoreClient::new(Arc::new(MemoryStore::new()));
        store.set(keys::SELECTED_PROJECT, "A").await.unwrap();
        store.set(keys::PROJECTS, &vec!["A"]).await.unwrap();
        let table = BindingTable::new(store);
        table.bind(WindowId(3), "A").await.unwrap();

        let all = table.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get(&WindowId(3)), Some(&"A".to_string()));
    }
}
