//! # tabsync-core
//!
//! Keeps browser windows and user-defined projects in step: which tab URLs
//! belong to which project, which project each window shows, which tabs ride
//! along when the user switches projects.
//!
//! ## Design Principles
//!
//! - **Async collaborators**: the key-value store and the browser are traits
//!   (`KeyValueStore`, `TabProvider`); hosts plug in their own.
//! - **Events race**: every handler re-reads state from the store, and stale
//!   tab/window ids are treated as no-ops rather than errors.
//! - **Graceful degradation**: missing or malformed stored values read as
//!   empty. Provider failures are logged and the step is skipped.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabsync_core::{MemoryStore, SimulatedBrowser, SyncConfig, SyncEngine};
//!
//! let browser = Arc::new(SimulatedBrowser::new());
//! let events = browser.subscribe();
//! let engine = SyncEngine::new(browser, Arc::new(MemoryStore::new()), &SyncConfig::default());
//! engine.startup().await?;
//! tokio::spawn({ let engine = engine.clone(); async move { engine.run(events).await } });
//! engine.add_project("Work").await?;
//! ```

pub mod bindings;
pub mod carry_over;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod events;
pub mod new_window;
pub mod orchestrator;
pub mod provider;
pub mod reconciler;
pub mod registry;
pub mod storage;
pub mod store;

pub use bindings::{BindingTable, Bindings};
pub use carry_over::{CarryOverEntries, CarryOverSet, CarryOverToggle};
pub use config::{load_config, SyncConfig};
pub use engine::SyncEngine;
pub use error::{ProviderError, Result, StaleRef, StoreError, SyncError};
pub use event_log::EventLog;
pub use events::BrowserEvent;
pub use new_window::{NewWindowFlow, NewWindowOutcome};
pub use orchestrator::{PendingSwitch, SwitchOrchestrator, SwitchOutcome, SwitchReport, SwitchRequest};
pub use provider::{SimulatedBrowser, TabProvider};
pub use reconciler::{ReconcileOutcome, TabReconciler};
pub use registry::{ProjectRegistry, ProjectTabs};
pub use storage::StorageConfig;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreClient, StoreMap};
