//! Statevault — a state-persistence layer for in-memory application state.
//!
//! The crate snapshots the persistable subset of a live key-value state map
//! to a durable local store, restores it on startup, and optionally keeps it
//! synchronized on every mutation. Selected fields can be encrypted at rest.
//!
//! Subsystems:
//! - [`core_storage`] — two interchangeable storage backends behind one
//!   contract: a simple synchronous key-value store and an asynchronous
//!   schema-versioned object store.
//! - [`core_persist`] — the persistence pipeline: backend selection,
//!   field-level encryption, and the orchestrator that reconciles persisted
//!   state with live state.
//! - [`core_state`] — the live state container and its mutation feed, modeled
//!   as explicit collaborators so the pipeline is wired by dependency
//!   injection rather than framework hooks.

pub mod config;
pub mod core_persist;
pub mod core_state;
pub mod core_storage;
pub mod logging;

pub use config::{ConfigError, VaultConfig};
pub use core_persist::{
    CipherService, DbOptions, KeyPath, PersistError, PersistOptions, PersistResult, Persister,
    StatePersistence, StorePersister, WatchedStores,
};
pub use core_state::{Mutation, MutationKind, StateStore};
pub use core_storage::{StorageBackend, StorageError, StorageResult};
pub use logging::{init_logging, LogLevel};
