//! Storage Backend Implementations
//!
//! Two interchangeable backends satisfy the [`StorageBackend`] contract: a
//! simple synchronous key-value store ([`KvStore`]) and an asynchronous,
//! schema-versioned object store on SQLite ([`ObjectStore`]).

pub mod backend;
pub mod errors;
pub mod kv_store;
pub mod object_store;

pub use backend::StorageBackend;
pub use errors::{StorageError, StorageResult};
pub use kv_store::KvStore;
pub use object_store::{ObjectStore, VersionSlot};
