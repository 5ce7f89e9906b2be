//! Versioned Object-Store Backend
//!
//! Asynchronous storage for key-bearing JSON records on SQLite, with an
//! IndexedDB-style open handshake: the store opens the database at the
//! schema version recorded in a side-channel slot, creates its table lazily
//! during the upgrade step, and recovers from a structural mismatch by
//! incrementing the stored version and reopening. Blocking SQLite work runs
//! on the tokio blocking pool behind a connection pool.

use crate::core_storage::backend::StorageBackend;
use crate::core_storage::errors::{StorageError, StorageResult};
use crate::core_storage::kv_store::KvStore;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Database file shared by every object store under one data directory
const DB_FILE: &str = "object_store.db";

/// Give up on the open handshake after this many version bumps
const MAX_OPEN_ATTEMPTS: u32 = 8;

/// Side-channel slot holding the object-store schema version.
///
/// The version lives in simple key-value storage, outside the database it
/// describes, so it survives store recreation.
#[derive(Clone)]
pub struct VersionSlot {
    store: Arc<KvStore>,
    key: String,
}

impl VersionSlot {
    pub fn new(store: Arc<KvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Currently stored version, defaulting to 1
    pub fn current(&self) -> u32 {
        match self.store.get_sync(&self.key) {
            Ok(Some(Value::Number(n))) => n.as_u64().map(|v| v as u32).unwrap_or(1),
            Ok(_) => 1,
            Err(e) => {
                warn!(slot = %self.key, error = %e, "VersionSlot: unreadable, assuming version 1");
                1
            }
        }
    }

    pub fn save(&self, version: u32) -> StorageResult<()> {
        self.store.set_sync(&Value::from(version), &self.key)
    }
}

/// Asynchronous versioned object store
pub struct ObjectStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    table: String,
    key_field: String,
    versions: VersionSlot,
    opened: OnceCell<()>,
}

impl ObjectStore {
    /// Create a store for `table` inside the shared database under
    /// `data_dir`. Records are keyed by the `key_field` column. The open
    /// handshake itself is deferred to the first operation.
    pub fn new(
        data_dir: &Path,
        table: impl Into<String>,
        key_field: impl Into<String>,
        versions: VersionSlot,
    ) -> StorageResult<Self> {
        std::fs::create_dir_all(data_dir)?;

        let manager = SqliteConnectionManager::file(data_dir.join(DB_FILE));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StorageError::Unavailable(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            table: table.into(),
            key_field: key_field.into(),
            versions,
            opened: OnceCell::new(),
        })
    }

    /// Run the open handshake at most once per instance
    async fn ensure_open(&self) -> StorageResult<()> {
        self.opened.get_or_try_init(|| self.open()).await.map(|_| ())
    }

    /// Open at the stored version; on a version conflict, bump the stored
    /// version and retry the whole sequence
    async fn open(&self) -> StorageResult<()> {
        for _ in 0..MAX_OPEN_ATTEMPTS {
            let requested = self.versions.current();
            match self.try_open(requested).await {
                Ok(()) => return Ok(()),
                Err(StorageError::VersionConflict { requested, actual }) => {
                    let next = requested.max(actual) + 1;
                    debug!(
                        table = %self.table,
                        requested,
                        actual,
                        next,
                        "ObjectStore: version conflict, bumping stored version"
                    );
                    self.versions.save(next)?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(StorageError::Unavailable(format!(
            "could not open object store '{}' after {} attempts",
            self.table, MAX_OPEN_ATTEMPTS
        )))
    }

    async fn try_open(&self, requested: u32) -> StorageResult<()> {
        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();

        run_blocking(move || {
            let conn = pool.get().map_err(unavailable)?;

            let actual: i64 = conn
                .query_row("PRAGMA user_version", [], |row| row.get(0))
                .map_err(unavailable)?;
            let actual = actual.max(0) as u32;

            if actual > requested {
                // The database is ahead of the slot; the caller recovers.
                return Err(StorageError::VersionConflict { requested, actual });
            }

            if requested > actual {
                // Upgrade step: the table is created here and only here.
                conn.execute_batch(&format!(
                    r#"CREATE TABLE IF NOT EXISTS "{table}" (
                        "{key_field}" TEXT PRIMARY KEY,
                        record TEXT NOT NULL,
                        updated_at INTEGER NOT NULL
                    )"#
                ))
                .map_err(unavailable)?;
                conn.pragma_update(None, "user_version", requested as i64)
                    .map_err(unavailable)?;
                return Ok(());
            }

            // Versions agree, so no upgrade runs; a missing table is a
            // structural mismatch recovered by a version bump.
            let present: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    params![table],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            if !present {
                return Err(StorageError::VersionConflict { requested, actual });
            }

            Ok(())
        })
        .await
    }
}

#[async_trait]
impl StorageBackend for ObjectStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_open().await?;

        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();
        let key = key.to_string();

        run_blocking(move || {
            let conn = pool.get().map_err(unavailable)?;
            let raw: Option<String> = conn
                .query_row(
                    &format!(r#"SELECT record FROM "{table}" WHERE "{key_field}" = ?1"#),
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;

            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set_item(&self, value: Value, key: &str) -> StorageResult<()> {
        self.ensure_open().await?;

        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();
        let key = key.to_string();

        run_blocking(move || {
            let raw = serde_json::to_string(&value)?;
            let mut conn = pool.get().map_err(unavailable)?;
            let tx = conn.transaction().map_err(unavailable)?;

            // Add semantics: a duplicate key is an error, callers that want
            // overwrite go through update_item.
            tx.execute(
                &format!(
                    r#"INSERT INTO "{table}" ("{key_field}", record, updated_at) VALUES (?1, ?2, ?3)"#
                ),
                params![key, raw, current_timestamp()],
            )
            .map_err(unavailable)?;
            tx.commit().map_err(unavailable)
        })
        .await
    }

    async fn update_item(&self, value: Value, key: &str) -> StorageResult<()> {
        self.ensure_open().await?;

        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();
        let key = key.to_string();

        run_blocking(move || {
            let raw = serde_json::to_string(&value)?;
            let mut conn = pool.get().map_err(unavailable)?;
            let tx = conn.transaction().map_err(unavailable)?;

            tx.execute(
                &format!(
                    r#"INSERT INTO "{table}" ("{key_field}", record, updated_at) VALUES (?1, ?2, ?3)
                       ON CONFLICT("{key_field}") DO UPDATE SET
                           record = excluded.record,
                           updated_at = excluded.updated_at"#
                ),
                params![key, raw, current_timestamp()],
            )
            .map_err(unavailable)?;
            tx.commit().map_err(unavailable)
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.ensure_open().await?;

        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();
        let key = key.to_string();

        run_blocking(move || {
            let conn = pool.get().map_err(unavailable)?;
            conn.execute(
                &format!(r#"DELETE FROM "{table}" WHERE "{key_field}" = ?1"#),
                params![key],
            )
            .map_err(unavailable)?;
            Ok(())
        })
        .await
    }

    async fn remove_items(&self, excluded_keys: Option<&[String]>) -> StorageResult<()> {
        self.ensure_open().await?;

        let pool = self.pool.clone();
        let table = self.table.clone();
        let key_field = self.key_field.clone();
        let excluded: Vec<String> = excluded_keys.map(<[String]>::to_vec).unwrap_or_default();

        run_blocking(move || {
            let conn = pool.get().map_err(unavailable)?;

            if excluded.is_empty() {
                conn.execute(&format!(r#"DELETE FROM "{table}""#), [])
                    .map_err(unavailable)?;
            } else {
                let placeholders: Vec<String> =
                    (1..=excluded.len()).map(|i| format!("?{}", i)).collect();
                conn.execute(
                    &format!(
                        r#"DELETE FROM "{table}" WHERE "{key_field}" NOT IN ({})"#,
                        placeholders.join(", ")
                    ),
                    params_from_iter(excluded.iter()),
                )
                .map_err(unavailable)?;
            }

            Ok(())
        })
        .await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.remove_items(None).await
    }
}

async fn run_blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Task join error: {}", e)))?
}

fn unavailable(e: impl std::fmt::Display) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
