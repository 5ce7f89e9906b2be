//! Storage Backend Trait
//!
//! One contract for both backend shapes. The simple backend keys by an
//! explicit string key; the versioned backend stores key-bearing records,
//! which is why `set_item` takes the value first and the key second.

use crate::core_storage::errors::StorageResult;
use async_trait::async_trait;
use serde_json::Value;

/// Storage backend contract
///
/// Implementations must ensure:
/// - Overwrite, not append: one record per key, replaced on rewrite
/// - Reads of never-written keys return `Ok(None)`, not an error
/// - Failures below the transaction layer are logged and degrade rather
///   than panic
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Currently stored value for `key`, or `None` if absent
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Persist `value` under `key` with add semantics: the versioned backend
    /// rejects a duplicate key, the simple backend overwrites
    async fn set_item(&self, value: Value, key: &str) -> StorageResult<()>;

    /// Overwrite the existing record for `key` (put semantics)
    async fn update_item(&self, value: Value, key: &str) -> StorageResult<()>;

    /// Delete the entry for `key` if present; no-op if absent
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Bulk delete all entries except those named in `excluded_keys`;
    /// `None` clears everything
    async fn remove_items(&self, excluded_keys: Option<&[String]>) -> StorageResult<()>;

    /// Unconditional wipe of all entries for this backend instance
    async fn clear(&self) -> StorageResult<()>;
}
