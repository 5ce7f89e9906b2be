//! Process-level persistence context
//!
//! `StatePersistence` owns everything orchestrators share: the default
//! persister, the optional cipher service (constructed when the
//! configuration carries a passphrase), and the watched-store registry.
//! Hosts build one per process and attach each store to it.

use crate::config::VaultConfig;
use crate::core_persist::cipher::CipherService;
use crate::core_persist::errors::PersistResult;
use crate::core_persist::options::PersistOptions;
use crate::core_persist::persister::{DbOptions, KeyPath, Persister};
use crate::core_persist::registry::WatchedStores;
use crate::core_persist::store_persister::{MutationCallback, StorePersister};
use crate::core_state::StateStore;
use std::sync::Arc;
use tracing::debug;

/// Shared context for all persisted stores of one process
pub struct StatePersistence {
    config: VaultConfig,
    persister: Arc<Persister>,
    cipher: Option<Arc<CipherService>>,
    watched: WatchedStores,
}

impl StatePersistence {
    /// Build the context from configuration: opens the default persister
    /// and, when a passphrase is configured, the shared cipher service.
    pub fn new(config: VaultConfig) -> PersistResult<Self> {
        let persister = Arc::new(Persister::new(DbOptions {
            name: config.db_name.clone(),
            key_path: Some(KeyPath::StoreName),
            data_dir: config.data_dir.clone(),
        })?);

        let cipher = config
            .passphrase
            .as_deref()
            .map(|passphrase| Arc::new(CipherService::new(passphrase)));

        Ok(Self {
            config,
            persister,
            cipher,
            watched: WatchedStores::new(),
        })
    }

    /// Registry of stores currently live-persisting
    pub fn watched(&self) -> &WatchedStores {
        &self.watched
    }

    /// Attach a store to the pipeline.
    ///
    /// Options asking to watch mutations imply persistence, so
    /// `watch_mutation` without `persist` turns persistence on. Stores that
    /// end up with `persist` off are not attached and `None` is returned.
    /// The initial restore has completed by the time the handle is back.
    pub async fn attach(
        &self,
        store: Arc<StateStore>,
        options: PersistOptions,
    ) -> PersistResult<Option<Arc<StorePersister>>> {
        self.attach_with_callback(store, options, None).await
    }

    /// Like [`attach`](Self::attach), with a callback invoked after every
    /// mutation-triggered persist
    pub async fn attach_with_callback(
        &self,
        store: Arc<StateStore>,
        mut options: PersistOptions,
        mutation_callback: Option<MutationCallback>,
    ) -> PersistResult<Option<Arc<StorePersister>>> {
        if options.watch_mutation && !options.persist {
            options.persist = true;
        }
        if !options.persist {
            debug!(store = %store.id(), "persistence disabled, store not attached");
            return Ok(None);
        }

        let persister = match &options.db_name {
            Some(db_name) => Arc::new(Persister::new(DbOptions {
                name: db_name.clone(),
                key_path: Some(KeyPath::StoreName),
                data_dir: self.config.data_dir.clone(),
            })?),
            None => Arc::clone(&self.persister),
        };

        let orchestrator = StorePersister::attach(
            store,
            options,
            persister,
            self.cipher.clone(),
            self.watched.clone(),
            mutation_callback,
        )
        .await?;

        Ok(Some(orchestrator))
    }
}
