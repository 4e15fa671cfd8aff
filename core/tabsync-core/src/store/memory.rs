use std::sync::Mutex;

use async_trait::async_trait;

use super::{KeyValueStore, StoreMap};
use crate::error::StoreError;

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<StoreMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: StoreMap) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let entries = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, items: StoreMap) -> Result<(), StoreError> {
        self.lock()?.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<StoreMap, StoreError> {
        Ok(self.lock()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_omits_absent_keys() {
        let store = MemoryStore::new();
        let mut items = StoreMap::new();
        items.insert("a".to_string(), json!(1));
        store.set(items).await.unwrap();

        let values = store.get(&["a", "b"]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["a"], json!(1));
    }

    #[tokio::test]
    async fn remove_absent_key_is_ok() {
        let store = MemoryStore::new();
        store.remove(&["missing"]).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
