//! Offline operations on a tabsync store file.
//!
//! Each command returns the text to print so it can be checked without a
//! terminal.

use std::path::Path;
use std::sync::Arc;

use tabsync_core::{
    BindingTable, CarryOverSet, EventLog, JsonFileStore, ProjectRegistry, Result, StoreClient,
    SyncConfig,
};
use tabsync_protocol::WindowId;

pub struct Context {
    registry: ProjectRegistry,
    bindings: BindingTable,
    carry_over: CarryOverSet,
    log: EventLog,
    json: bool,
}

impl Context {
    pub fn open(store_path: &Path, config: &SyncConfig, json: bool) -> Result<Self> {
        let backend = JsonFileStore::load(store_path)?;
        tracing::debug!(path = %backend.path().display(), "Opened store");
        let store = StoreClient::new(Arc::new(backend));
        let bindings = BindingTable::new(store.clone());
        let registry = ProjectRegistry::new(store.clone(), bindings.clone());
        let carry_over = CarryOverSet::new(store.clone(), registry.clone());
        let log = EventLog::new(store, config.event_log_capacity);
        Ok(Self {
            registry,
            bindings,
            carry_over,
            log,
            json,
        })
    }
}

pub async fn projects(ctx: &Context) -> Result<String> {
    let names = ctx.registry.list_projects().await?;
    let tabs = ctx.registry.all_tabs().await?;
    if ctx.json {
        let listing: Vec<_> = names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "tabs": tabs.get(name).map_or(0, Vec::len),
                })
            })
            .collect();
        return Ok(serde_json::Value::Array(listing).to_string());
    }
    if names.is_empty() {
        return Ok("No projects".to_string());
    }
    Ok(names
        .iter()
        .map(|name| {
            let count = tabs.get(name).map_or(0, Vec::len);
            format!("{}  ({} tabs)", name, count)
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn add(ctx: &Context, name: &str) -> Result<String> {
    ctx.registry.add_project(name).await?;
    Ok(format!("Added project {}", name))
}

pub async fn delete(ctx: &Context, name: &str) -> Result<String> {
    ctx.registry.delete_project(name).await?;
    Ok(format!("Deleted project {}", name))
}

pub async fn tabs(ctx: &Context, name: &str) -> Result<String> {
    let urls = ctx.registry.get_tabs(name).await?;
    if ctx.json {
        return Ok(serde_json::json!(urls).to_string());
    }
    Ok(urls.join("\n"))
}

pub async fn bindings(ctx: &Context) -> Result<String> {
    let bindings = ctx.bindings.all().await?;
    if ctx.json {
        let map: serde_json::Map<String, serde_json::Value> = bindings
            .iter()
            .map(|(window_id, project)| (window_id.to_string(), project.clone().into()))
            .collect();
        return Ok(serde_json::Value::Object(map).to_string());
    }
    Ok(bindings
        .iter()
        .map(|(window_id, project)| format!("window {} -> {}", window_id, project))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Drops bindings for every window not listed as open.
pub async fn gc(ctx: &Context, live: &[i64]) -> Result<String> {
    let live: Vec<WindowId> = live.iter().copied().map(WindowId).collect();
    let removed = ctx.bindings.garbage_collect(&live).await?;
    Ok(format!("Removed {} stale bindings", removed.len()))
}

pub async fn carry_over(ctx: &Context) -> Result<String> {
    let entries = ctx.carry_over.entries().await?;
    if ctx.json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(tab_id, url)| (tab_id.to_string(), url.clone().into()))
            .collect();
        return Ok(serde_json::Value::Object(map).to_string());
    }
    Ok(entries
        .iter()
        .map(|(tab_id, url)| format!("tab {}  {}", tab_id, url))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Prints the newest `limit` entries, oldest first.
pub async fn log(ctx: &Context, limit: usize) -> Result<String> {
    let entries = ctx.log.entries().await?;
    let start = entries.len().saturating_sub(limit);
    Ok(entries[start..].join("\n"))
}
