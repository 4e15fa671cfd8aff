//! Window/tab provider contract.
//!
//! The browser's windowing engine is an external collaborator; the engine only
//! needs typed query/create/remove/move calls that each resolve exactly once to
//! a result or a failure. Lifecycle events arrive separately as
//! [`crate::events::BrowserEvent`]s.

mod simulated;

use async_trait::async_trait;
use tabsync_protocol::{
    CreateTabProps, CreateWindowProps, MoveTarget, Tab, TabId, TabQuery, Window, WindowId,
};

use crate::error::ProviderError;

pub use simulated::SimulatedBrowser;

/// Trait for browser integrations.
///
/// Implementors should:
/// - Report vanished tabs/windows as [`ProviderError::NotFound`], not `Call`
/// - Return moved tabs in the order their ids were passed to `move_tabs`
/// - Never panic; every failure is an `Err`
#[async_trait]
pub trait TabProvider: Send + Sync {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, ProviderError>;

    async fn create_tab(&self, props: CreateTabProps) -> Result<Tab, ProviderError>;

    async fn remove_tabs(&self, ids: &[TabId]) -> Result<(), ProviderError>;

    /// Moves tabs to another window. A moved tab may come back under a new id.
    async fn move_tabs(&self, ids: &[TabId], target: MoveTarget)
        -> Result<Vec<Tab>, ProviderError>;

    async fn create_window(&self, props: CreateWindowProps) -> Result<Window, ProviderError>;

    async fn remove_window(&self, id: WindowId) -> Result<(), ProviderError>;

    async fn get_all_windows(&self) -> Result<Vec<Window>, ProviderError>;

    /// The window the user is currently interacting with.
    async fn get_current_window(&self) -> Result<Window, ProviderError>;

    async fn remove_tab(&self, id: TabId) -> Result<(), ProviderError> {
        self.remove_tabs(&[id]).await
    }
}
