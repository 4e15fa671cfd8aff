//! Project registry: project names and each project's tab-URL snapshot.
//!
//! Persisted under two keys, `projects` (ordered names) and `projectTabs`
//! (name → URLs). The store is only atomic per key, so adding a project writes
//! the name list first; a crash between the two writes leaves a project with no
//! tab list, which reads back as empty.

use std::collections::BTreeMap;

use tabsync_protocol::keys;

use crate::bindings::BindingTable;
use crate::error::{Result, SyncError};
use crate::store::StoreClient;

pub type ProjectTabs = BTreeMap<String, Vec<String>>;

#[derive(Clone)]
pub struct ProjectRegistry {
    store: StoreClient,
    bindings: BindingTable,
}

impl ProjectRegistry {
    pub fn new(store: StoreClient, bindings: BindingTable) -> Self {
        Self { store, bindings }
    }

    pub async fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get::<Vec<String>>(keys::PROJECTS)
            .await?
            .unwrap_or_default())
    }

    /// Appends `name` to the project list with an empty tab list.
    /// Fails with [`SyncError::DuplicateProject`] for empty or existing names.
    pub async fn add_project(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SyncError::DuplicateProject(name.to_string()));
        }

        let mut projects = self.list_projects().await?;
        if projects.iter().any(|existing| existing == name) {
            return Err(SyncError::DuplicateProject(name.to_string()));
        }
        projects.push(name.to_string());
        self.store.set(keys::PROJECTS, &projects).await?;

        let mut tabs = self.all_tabs().await?;
        tabs.insert(name.to_string(), Vec::new());
        self.store.set(keys::PROJECT_TABS, &tabs).await?;

        tracing::info!(project = name, "Project added");
        Ok(())
    }

    /// Removes `name`, its tab list and every window binding to it.
    /// Deleting an absent project is a no-op.
    pub async fn delete_project(&self, name: &str) -> Result<()> {
        let mut projects = self.list_projects().await?;
        let before = projects.len();
        projects.retain(|existing| existing != name);
        if projects.len() != before {
            self.store.set(keys::PROJECTS, &projects).await?;
        }

        let mut tabs = self.all_tabs().await?;
        if tabs.remove(name).is_some() {
            self.store.set(keys::PROJECT_TABS, &tabs).await?;
        }

        let unbound = self.bindings.unbind_project(name).await?;
        tracing::info!(project = name, unbound = unbound.len(), "Project deleted");
        Ok(())
    }

    /// Overwrites the project's tab list with `urls` (a snapshot, not a merge).
    pub async fn record_tabs(&self, name: &str, urls: &[String]) -> Result<()> {
        let mut tabs = self.all_tabs().await?;
        tabs.insert(name.to_string(), urls.to_vec());
        self.store.set(keys::PROJECT_TABS, &tabs).await?;
        Ok(())
    }

    pub async fn get_tabs(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.all_tabs().await?.remove(name).unwrap_or_default())
    }

    /// Returns the recorded tab list, creating an empty one if none exists yet.
    pub async fn ensure_tab_list(&self, name: &str) -> Result<Vec<String>> {
        let mut tabs = self.all_tabs().await?;
        if let Some(urls) = tabs.get(name) {
            return Ok(urls.clone());
        }
        tabs.insert(name.to_string(), Vec::new());
        self.store.set(keys::PROJECT_TABS, &tabs).await?;
        Ok(Vec::new())
    }

    pub async fn all_tabs(&self) -> Result<ProjectTabs> {
        Ok(self
            .store
            .get::<ProjectTabs>(keys::PROJECT_TABS)
            .await?
            .unwrap_or_default())
    }

    /// Drops every occurrence of `url` from every project's list.
    pub async fn remove_url_everywhere(&self, url: &str) -> Result<()> {
        let mut tabs = self.all_tabs().await?;
        let mut changed = false;
        for urls in tabs.values_mut() {
            let before = urls.len();
            urls.retain(|existing| existing != url);
            changed |= urls.len() != before;
        }
        if changed {
            self.store.set(keys::PROJECT_TABS, &tabs).await?;
        }
        Ok(())
    }
}
