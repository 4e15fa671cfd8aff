//! Carry-over set: tabs marked to survive a project switch.
//!
//! Keyed by tab id, valued by the tab's last-known URL, persisted under
//! `carryOverTabs` with stringified ids as JSON object keys.
//!
//! Tab ids are only valid while the tab instance exists. Entries for tabs that
//! are gone are stale: every lookup treats them as absent, and
//! [`CarryOverSet::prune_stale`] drops them once the full live tab set is known.
//! A tab moved into another window during a switch can come back under a new
//! id, so migration re-keys entries with [`CarryOverSet::rekey`] instead of
//! tracking by the old id.
//!
//! All read-modify-write sequences on the set are serialized within the
//! process; `rekey` in particular must never interleave with a concurrent
//! `mark` or `unmark`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tabsync_protocol::{keys, Tab, TabId};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::registry::ProjectRegistry;
use crate::store::StoreClient;

pub type CarryOverEntries = BTreeMap<TabId, String>;

/// What a context-menu toggle did, for the presentation layer to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryOverToggle {
    Marked,
    Unmarked,
}

#[derive(Clone)]
pub struct CarryOverSet {
    store: StoreClient,
    registry: ProjectRegistry,
    write_lock: Arc<Mutex<()>>,
}

impl CarryOverSet {
    pub fn new(store: StoreClient, registry: ProjectRegistry) -> Self {
        Self {
            store,
            registry,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn entries(&self) -> Result<CarryOverEntries> {
        let raw = self
            .store
            .get::<BTreeMap<String, String>>(keys::CARRY_OVER_TABS)
            .await?
            .unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|(key, url)| match key.parse::<i64>() {
                Ok(id) => Some((TabId(id), url)),
                Err(_) => {
                    tracing::warn!(key = %key, "Ignoring carry-over entry with non-numeric tab id");
                    None
                }
            })
            .collect())
    }

    async fn save(&self, entries: &CarryOverEntries) -> Result<()> {
        let raw: BTreeMap<String, &String> = entries
            .iter()
            .map(|(id, url)| (id.to_string(), url))
            .collect();
        self.store.set(keys::CARRY_OVER_TABS, &raw).await?;
        Ok(())
    }

    /// Marks `tab_id` as carry-over and drops `url` from every project's tab
    /// list; a carry-over tab is not part of any project's membership.
    pub async fn mark(&self, tab_id: TabId, url: &str) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut entries = self.entries().await?;
            entries.insert(tab_id, url.to_string());
            self.save(&entries).await?;
        }
        self.registry.remove_url_everywhere(url).await?;
        tracing::info!(tab_id = %tab_id, url, "Tab marked for carry over");
        Ok(())
    }

    /// Returns whether an entry was removed.
    pub async fn unmark(&self, tab_id: TabId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        if entries.remove(&tab_id).is_none() {
            return Ok(false);
        }
        self.save(&entries).await?;
        tracing::info!(tab_id = %tab_id, "Tab removed from carry over");
        Ok(true)
    }

    /// Tracks navigation of a marked tab. Unmarked tabs are ignored.
    pub async fn on_url_changed(&self, tab_id: TabId, new_url: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        match entries.get_mut(&tab_id) {
            Some(url) if url != new_url => {
                *url = new_url.to_string();
            }
            _ => return Ok(false),
        }
        self.save(&entries).await?;
        Ok(true)
    }

    pub async fn is_marked(&self, tab_id: TabId) -> Result<bool> {
        Ok(self.entries().await?.contains_key(&tab_id))
    }

    pub async fn urls(&self) -> Result<HashSet<String>> {
        Ok(self.entries().await?.into_values().collect())
    }

    /// Replaces the `old` entry with `new → url` in a single write.
    pub async fn rekey(&self, old: TabId, new: TabId, url: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        entries.remove(&old);
        entries.insert(new, url.to_string());
        self.save(&entries).await?;
        tracing::debug!(old = %old, new = %new, url, "Carry-over entry re-keyed");
        Ok(())
    }

    /// Context-menu action: marks an unmarked tab, unmarks a marked one.
    pub async fn toggle(&self, tab: &Tab) -> Result<CarryOverToggle> {
        if self.is_marked(tab.id).await? {
            self.unmark(tab.id).await?;
            Ok(CarryOverToggle::Unmarked)
        } else {
            self.mark(tab.id, &tab.url).await?;
            Ok(CarryOverToggle::Marked)
        }
    }

    /// Drops entries whose tab is not in `live`. Returns how many were dropped.
    pub async fn prune_stale(&self, live: &HashSet<TabId>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|id, _| live.contains(id));
        let dropped = before - entries.len();
        if dropped > 0 {
            self.save(&entries).await?;
            tracing::info!(dropped, "Dropped carry-over entries for closed tabs");
        }
        Ok(dropped)
    }
}
