// Copyright 2025 Cowboy AI, LLC.

//! Durable key/value storage backends
//!
//! The runtime only needs string values under string keys, with
//! synchronous access. [`InMemoryStorage`] is the default; [`JsonFileStorage`]
//! keeps every key in one JSON file so state survives process restarts.

use crate::errors::{WorkbenchError, WorkbenchResult};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Synchronous string key/value storage
pub trait KeyValueStorage: fmt::Debug {
    /// Read a value, `None` when the key is absent
    fn get_item(&self, key: &str) -> WorkbenchResult<Option<String>>;

    /// Write a value, replacing any previous one
    fn set_item(&self, key: &str, value: &str) -> WorkbenchResult<()>;

    /// Delete a key; deleting an absent key succeeds
    fn remove_item(&self, key: &str) -> WorkbenchResult<()>;

    /// All stored keys, sorted
    fn keys(&self) -> WorkbenchResult<Vec<String>>;
}

/// Storage that lives as long as the process
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RefCell<BTreeMap<String, String>>,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get_item(&self, key: &str) -> WorkbenchResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> WorkbenchResult<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> WorkbenchResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> WorkbenchResult<Vec<String>> {
        Ok(self.items.borrow().keys().cloned().collect())
    }
}

/// Storage backed by a single JSON object on disk
///
/// The file is read once on open and rewritten on every change.
pub struct JsonFileStorage {
    path: PathBuf,
    items: RefCell<BTreeMap<String, String>>,
}

impl JsonFileStorage {
    /// Open the file at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> WorkbenchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(WorkbenchError::Storage(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        info!(path = %path.display(), keys = items.len(), "opened json file storage");
        Ok(Self {
            path,
            items: RefCell::new(items),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> WorkbenchResult<()> {
        let contents = serde_json::to_string_pretty(&*self.items.borrow())?;
        fs::write(&self.path, contents).map_err(|err| {
            WorkbenchError::Storage(format!("failed to write {}: {err}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "flushed json file storage");
        Ok(())
    }
}

impl fmt::Debug for JsonFileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStorage")
            .field("path", &self.path)
            .field("keys", &self.items.borrow().len())
            .finish()
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get_item(&self, key: &str) -> WorkbenchResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> WorkbenchResult<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove_item(&self, key: &str) -> WorkbenchResult<()> {
        let removed = self.items.borrow_mut().remove(key).is_some();
        if removed {
            self.flush()?;
        }
        Ok(())
    }

    fn keys(&self) -> WorkbenchResult<Vec<String>> {
        Ok(self.items.borrow().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_round_trip() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get_item("a").unwrap(), None);
        storage.set_item("a", "1").unwrap();
        storage.set_item("a", "2").unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("2"));
        storage.remove_item("a").unwrap();
        storage.remove_item("a").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_json_file_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "reservoir-workbench-storage-{}.json",
            uuid::Uuid::new_v4()
        ));
        {
            let storage = JsonFileStorage::open(&path).unwrap();
            storage.set_item("Grid3D-0-state", r#"{"zoom":2}"#).unwrap();
            storage.set_item("other", "x").unwrap();
            storage.remove_item("other").unwrap();
        }
        let reopened = JsonFileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_item("Grid3D-0-state").unwrap().as_deref(),
            Some(r#"{"zoom":2}"#)
        );
        assert_eq!(reopened.keys().unwrap(), vec!["Grid3D-0-state".to_string()]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_json_file_rejects_garbage() {
        let path = std::env::temp_dir().join(format!(
            "reservoir-workbench-garbage-{}.json",
            uuid::Uuid::new_v4()
        ));
        fs::write(&path, "not json").unwrap();
        assert!(JsonFileStorage::open(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
