//! Simple Key-Value Backend
//!
//! Synchronous string-keyed storage: every value is serialized to a JSON
//! string and kept in an in-process map. The `durable` flavor write-through
//! persists the whole map to a single JSON file; the `memory` flavor lives
//! for the process only. Both are cheap enough that the async contract is
//! satisfied without suspension.

use crate::core_storage::backend::StorageBackend;
use crate::core_storage::errors::StorageResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Simple synchronous key-value store
pub struct KvStore {
    entries: Mutex<HashMap<String, String>>,
    path: Option<PathBuf>,
}

impl KvStore {
    /// File-backed store: loads existing entries from `path` and writes the
    /// whole map back on every change. A missing or unreadable file starts
    /// the store empty; the failure is reported, never raised.
    pub fn durable(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "KvStore: cannot create data directory");
            }
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "KvStore: corrupted store file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    /// Memory-only store, dropped with the process
    pub fn memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> StorageResult<()> {
        if let Some(path) = &self.path {
            let raw = serde_json::to_string(entries)?;
            std::fs::write(path, raw)?;
        }
        Ok(())
    }

    pub(crate) fn get_sync(&self, key: &str) -> StorageResult<Option<Value>> {
        let entries = self.lock();
        match entries.get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn set_sync(&self, value: &Value, key: &str) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        let mut entries = self.lock();
        entries.insert(key.to_string(), raw);
        self.flush(&entries)
    }

    fn remove_sync(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.lock();
        entries.remove(key);
        self.flush(&entries)
    }

    fn remove_items_sync(&self, excluded_keys: Option<&[String]>) -> StorageResult<()> {
        let mut entries = self.lock();
        match excluded_keys {
            Some(excluded) => entries.retain(|key, _| excluded.iter().any(|e| e == key)),
            None => entries.clear(),
        }
        self.flush(&entries)
    }
}

#[async_trait]
impl StorageBackend for KvStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        self.get_sync(key)
    }

    async fn set_item(&self, value: Value, key: &str) -> StorageResult<()> {
        self.set_sync(&value, key)
    }

    async fn update_item(&self, value: Value, key: &str) -> StorageResult<()> {
        // Same shape as set for a string-keyed map: overwrite in place.
        self.set_sync(&value, key)
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.remove_sync(key)
    }

    async fn remove_items(&self, excluded_keys: Option<&[String]>) -> StorageResult<()> {
        self.remove_items_sync(excluded_keys)
    }

    async fn clear(&self) -> StorageResult<()> {
        self.remove_items_sync(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = KvStore::memory();

        store.set_item(json!({"a": 1}), "k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), Some(json!({"a": 1})));

        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);

        // Removing an absent key is a no-op
        store.remove_item("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_never_written_key_is_none() {
        let store = KvStore::memory();
        assert_eq!(store.get_item("never").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_items_keeps_excluded() {
        let store = KvStore::memory();
        store.set_item(json!(1), "a").await.unwrap();
        store.set_item(json!(2), "b").await.unwrap();
        store.set_item(json!(3), "c").await.unwrap();

        store
            .remove_items(Some(&["b".to_string()]))
            .await
            .unwrap();

        assert_eq!(store.get_item("a").await.unwrap(), None);
        assert_eq!(store.get_item("b").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get_item("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_wipes_everything() {
        let store = KvStore::memory();
        store.set_item(json!("x"), "a").await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get_item("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_durable_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let store = KvStore::durable(path.clone());
        store.set_item(json!(["one", 2]), "list").await.unwrap();
        drop(store);

        let reopened = KvStore::durable(path);
        assert_eq!(
            reopened.get_item("list").await.unwrap(),
            Some(json!(["one", 2]))
        );
    }

    #[tokio::test]
    async fn test_corrupted_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = KvStore::durable(path);
        assert_eq!(store.get_item("anything").await.unwrap(), None);
    }
}
