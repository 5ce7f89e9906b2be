//! Persistence Pipeline
//!
//! Everything between live state and the storage backends: backend
//! selection and contract normalization ([`Persister`]), field-level
//! encryption ([`CipherService`]), the per-store orchestrator
//! ([`StorePersister`]), and the process-level context that wires them
//! together ([`StatePersistence`]).

pub mod cipher;
pub mod errors;
pub mod options;
pub mod persister;
pub mod plugin;
pub mod registry;
pub mod store_persister;

#[cfg(test)]
mod tests;

pub use cipher::{CipherError, CipherService};
pub use errors::{PersistError, PersistResult};
pub use options::{FieldPolicy, PersistOptions, PersistencePolicy, NOT_PERSISTED_PROPERTIES};
pub use persister::{DbOptions, KeyPath, Persister};
pub use plugin::StatePersistence;
pub use registry::WatchedStores;
pub use store_persister::{MutationCallback, StorePersister};
