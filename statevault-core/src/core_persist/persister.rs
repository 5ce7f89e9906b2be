//! Backend selection and contract normalization
//!
//! A `Persister` wraps exactly one storage backend, chosen once at
//! construction from the requested store name: the reserved names route to
//! the simple key-value backend, anything else to the versioned object
//! store. It also papers over the two backend shapes — the simple backend
//! keys by explicit string key, the versioned one stores key-bearing
//! records — so callers see a uniform get/set/remove contract.
//!
//! This is the lowest layer that can meaningfully degrade: backend failures
//! are logged and surface as `None` / skipped writes, never as errors.

use crate::core_persist::errors::{PersistError, PersistResult};
use crate::core_storage::{KvStore, ObjectStore, StorageBackend, VersionSlot};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Reserved name for the durable simple backend
pub const LOCAL_STORE_NAME: &str = "local";

/// Reserved name for the memory-only simple backend
pub const SESSION_STORE_NAME: &str = "session";

const LOCAL_STORE_FILE: &str = "local_store.json";
const VERSIONS_FILE: &str = "storage_versions.json";
const VERSION_SLOT_KEY: &str = "object_store_version";

/// Field name used when a non-object item is stored as a versioned record
const WRAPPED_VALUE_FIELD: &str = "value";

/// Key field carried inside versioned records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPath {
    #[default]
    StoreName,
    Id,
}

impl KeyPath {
    pub fn field(&self) -> &'static str {
        match self {
            KeyPath::StoreName => "store_name",
            KeyPath::Id => "id",
        }
    }
}

/// Backend-selection options, required at construction
#[derive(Debug, Clone, Default)]
pub struct DbOptions {
    /// Store name; reserved names select the simple backend
    pub name: String,
    /// Key field for versioned records, defaulting to [`KeyPath::StoreName`]
    pub key_path: Option<KeyPath>,
    /// Directory holding all on-disk storage
    pub data_dir: PathBuf,
}

/// Closed backend dispatch, resolved once at construction
enum BackendKind {
    Simple(KvStore),
    Versioned(ObjectStore),
}

/// Normalized storage façade over one backend
pub struct Persister {
    backend: BackendKind,
    db_name: String,
    key_field: &'static str,
}

impl Persister {
    /// Select and open the backend for `options.name`.
    ///
    /// Fails with [`PersistError::Configuration`] when no store name is
    /// supplied; this contract is fatal, not recoverable.
    pub fn new(options: DbOptions) -> PersistResult<Self> {
        if options.name.is_empty() {
            return Err(PersistError::Configuration(
                "DbOptions with a store name is required".to_string(),
            ));
        }

        let key_field = options.key_path.unwrap_or_default().field();

        let backend = match options.name.as_str() {
            LOCAL_STORE_NAME => {
                BackendKind::Simple(KvStore::durable(options.data_dir.join(LOCAL_STORE_FILE)))
            }
            SESSION_STORE_NAME => BackendKind::Simple(KvStore::memory()),
            name => {
                // The name becomes a SQL table identifier.
                if !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(PersistError::Configuration(format!(
                        "invalid store name: {name}"
                    )));
                }

                let versions = VersionSlot::new(
                    Arc::new(KvStore::durable(options.data_dir.join(VERSIONS_FILE))),
                    VERSION_SLOT_KEY,
                );
                BackendKind::Versioned(ObjectStore::new(
                    &options.data_dir,
                    name,
                    key_field,
                    versions,
                )?)
            }
        };

        Ok(Self {
            backend,
            db_name: options.name,
            key_field,
        })
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    fn backend(&self) -> &dyn StorageBackend {
        match &self.backend {
            BackendKind::Simple(kv) => kv,
            BackendKind::Versioned(os) => os,
        }
    }

    fn is_versioned(&self) -> bool {
        matches!(self.backend, BackendKind::Versioned(_))
    }

    /// Stored item for `key`, or `None` when absent or on any backend error
    pub async fn get_item(&self, key: &str) -> Option<Value> {
        match self.backend().get_item(key).await {
            Ok(item) => item.map(|value| self.unwrap_record(value)),
            Err(e) => {
                warn!(store = %self.db_name, key, error = %e, "Persister: read degraded to empty");
                None
            }
        }
    }

    /// Persist `item` under `key`, overwriting any previous record.
    ///
    /// The versioned backend raises on duplicate-key insertion, so an
    /// existence check routes rewrites through the update path; both paths
    /// write the newly computed item. A failed write is logged and leaves
    /// no durable trace of the latest snapshot.
    pub async fn set_item(&self, key: &str, item: Value) {
        let result = if self.is_versioned() {
            let record = self.wrap_record(key, item);
            let exists = match self.backend().get_item(key).await {
                Ok(found) => found.is_some(),
                Err(e) => {
                    warn!(store = %self.db_name, key, error = %e, "Persister: existence check failed, assuming absent");
                    false
                }
            };
            if exists {
                self.backend().update_item(record, key).await
            } else {
                self.backend().set_item(record, key).await
            }
        } else {
            self.backend().set_item(item, key).await
        };

        if let Err(e) = result {
            warn!(store = %self.db_name, key, error = %e, "Persister: write failed, latest snapshot not persisted");
        }
    }

    /// Delete the record for `key` if present
    pub async fn remove_item(&self, key: &str) {
        if let Err(e) = self.backend().remove_item(key).await {
            warn!(store = %self.db_name, key, error = %e, "Persister: remove failed");
        }
    }

    /// Versioned records carry the key field; strip it (and unwrap
    /// non-object items) before handing the value back
    fn unwrap_record(&self, value: Value) -> Value {
        if !self.is_versioned() {
            return value;
        }
        match value {
            Value::Object(mut record) => {
                record.remove(self.key_field);
                if record.len() == 1 {
                    if let Some(inner) = record.remove(WRAPPED_VALUE_FIELD) {
                        return inner;
                    }
                }
                Value::Object(record)
            }
            other => other,
        }
    }

    /// Tag an item with the key field for versioned storage; non-object
    /// items are wrapped under a value field
    fn wrap_record(&self, key: &str, item: Value) -> Value {
        match item {
            Value::Object(mut map) => {
                map.insert(self.key_field.to_string(), Value::String(key.to_string()));
                Value::Object(map)
            }
            other => {
                let mut map = Map::new();
                map.insert(self.key_field.to_string(), Value::String(key.to_string()));
                map.insert(WRAPPED_VALUE_FIELD.to_string(), other);
                Value::Object(map)
            }
        }
    }
}
