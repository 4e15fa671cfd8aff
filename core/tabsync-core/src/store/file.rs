//! File-backed key-value store.
//!
//! Keeps the whole key space in memory and rewrites `store.json` after every
//! mutation.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "projects": ["Work"],
//!     "projectTabs": { "Work": ["https://example.com"] }
//!   }
//! }
//! ```
//!
//! Loading is defensive: a missing, empty, corrupt or other-version file yields
//! an empty store with a warning rather than an error. Writes go through a temp
//! file + rename so a crash mid-write never leaves a torn file behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{KeyValueStore, StoreMap};
use crate::error::StoreError;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: StoreMap,
}

pub struct JsonFileStore {
    entries: Mutex<StoreMap>,
    file_path: PathBuf,
}

impl JsonFileStore {
    pub fn load(file_path: &Path) -> Result<Self, StoreError> {
        let entries = read_entries(file_path)?;
        Ok(Self {
            entries: Mutex::new(entries),
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Applies `apply` to a copy and only swaps it in once the copy is on
    /// disk, so a failed write leaves memory matching the file.
    fn mutate(&self, apply: impl FnOnce(&mut StoreMap)) -> Result<(), StoreError> {
        let mut entries = self.snapshot()?;
        let mut next = entries.clone();
        apply(&mut next);
        write_entries(&self.file_path, &next)?;
        *entries = next;
        Ok(())
    }

    fn snapshot(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("file store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap, StoreError> {
        let entries = self.snapshot()?;
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
        self.mutate(|entries| entries.extend(items))
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.mutate(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }

    async fn get_all(&self) -> Result<StoreMap, StoreError> {
        Ok(self.snapshot()?.clone())
    }
}

fn read_entries(file_path: &Path) -> Result<StoreMap, StoreError> {
    if !file_path.exists() {
        return Ok(StoreMap::new());
    }

    let content = fs_err::read_to_string(file_path).map_err(|source| StoreError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        tracing::warn!(path = %file_path.display(), "Empty store file, starting empty");
        return Ok(StoreMap::new());
    }

    match serde_json::from_str::<StoreFile>(&content) {
        Ok(store_file) if store_file.version == STORE_VERSION => Ok(store_file.entries),
        Ok(store_file) => {
            tracing::warn!(
                path = %file_path.display(),
                version = store_file.version,
                expected = STORE_VERSION,
                "Unsupported store file version, starting empty"
            );
            Ok(StoreMap::new())
        }
        Err(err) => {
            tracing::warn!(
                path = %file_path.display(),
                error = %err,
                "Failed to parse store file, starting empty"
            );
            Ok(StoreMap::new())
        }
    }
}

fn write_entries(file_path: &Path, entries: &StoreMap) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: file_path.to_path_buf(),
        source,
    };

    let store_file = StoreFile {
        version: STORE_VERSION,
        entries: entries.clone(),
    };
    let content = serde_json::to_string_pretty(&store_file).map_err(|source| StoreError::Encode {
        key: "*".to_string(),
        source,
    })?;

    let parent_dir = file_path
        .parent()
        .ok_or_else(|| StoreError::Backend("store file path has no parent directory".to_string()))?;
    fs_err::create_dir_all(parent_dir).map_err(io_err)?;

    let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(io_err)?;
    temp_file.write_all(content.as_bytes()).map_err(io_err)?;
    temp_file.flush().map_err(io_err)?;
    temp_file
        .persist(file_path)
        .map_err(|err| io_err(err.error))?;
    Ok(())
}
