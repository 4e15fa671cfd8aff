//! Persistent store client.
//!
//! The engine only relies on the get/set/remove/get-all contract of a shared
//! asynchronous key-value store. Calls are atomic per key but not across keys,
//! so every component owns its own keys (see `tabsync_protocol::keys`) and
//! never assumes two keys change together.
//!
//! - [`KeyValueStore`]: the backend contract, implemented by the host.
//! - [`StoreClient`]: typed JSON access on top of any backend.
//! - [`MemoryStore`] / [`JsonFileStore`]: in-process and file-backed backends.

mod file;
mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Key → JSON value snapshot, as returned by the store.
pub type StoreMap = BTreeMap<String, Value>;

/// Contract of the shared key-value store.
///
/// Implementors should:
/// - Omit absent keys from `get` results rather than returning `null`
/// - Apply each key of a `set` atomically (no torn values)
/// - Treat removing an absent key as success
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError>;

    async fn set(&self, items: StoreMap) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    async fn get_all(&self) -> Result<StoreMap, StoreError>;
}

/// Typed access to a [`KeyValueStore`].
///
/// Values that fail to decode are treated as absent and logged, the same way a
/// corrupt store file loads as empty. A bad value must never wedge the event
/// handlers that read it.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<dyn KeyValueStore>,
}

impl StoreClient {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut values = self.inner.get(&[key]).await?;
        Ok(values.remove(key).and_then(|value| decode(key, value)))
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let mut items = StoreMap::new();
        items.insert(key.to_string(), encoded);
        self.inner.set(items).await
    }

    pub async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.inner.remove(keys).await
    }

    pub async fn get_all(&self) -> Result<StoreMap, StoreError> {
        self.inner.get_all().await
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(key, error = %err, "Ignoring malformed stored value");
            None
        }
    }
}
