//! Per-store persistence orchestrator
//!
//! One `StorePersister` sits between a live [`StateStore`] and a
//! [`Persister`]: it computes the persistable subset of state, applies
//! field-level encryption, writes snapshots through the persister, restores
//! and reconciles them on startup, and gates mutation-triggered writes with
//! a per-store watch flag backed by the shared [`WatchedStores`] registry.
//!
//! All collaborators arrive through [`attach`](StorePersister::attach);
//! nothing is inherited and nothing is global.

use crate::core_persist::cipher::{CipherError, CipherService};
use crate::core_persist::errors::{PersistError, PersistResult};
use crate::core_persist::options::{is_empty_value, FieldPolicy, PersistOptions, PersistencePolicy, IS_LOADING_KEY};
use crate::core_persist::persister::Persister;
use crate::core_persist::registry::WatchedStores;
use crate::core_state::{Mutation, MutationKind, StateStore};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

/// Callback invoked with the live state and the mutation after each
/// mutation-triggered persist
pub type MutationCallback = Arc<dyn Fn(&Map<String, Value>, &Mutation) + Send + Sync>;

/// Orchestrates persistence for one store
pub struct StorePersister {
    store: Arc<StateStore>,
    persister: Arc<Persister>,
    cipher: Option<Arc<CipherService>>,
    policy: PersistencePolicy,
    watched: WatchedStores,
    mutation_callback: Option<MutationCallback>,
    /// Gates mutation-triggered writes
    watch_mutation: AtomicBool,
    /// Whether the persisted snapshot currently holds ciphertext; flipped
    /// with each crypt/decrypt pass
    is_encrypted: AtomicBool,
    /// The feed task is spawned at most once per instance
    subscribed: AtomicBool,
}

impl StorePersister {
    /// Wire a store into the persistence pipeline.
    ///
    /// The initial restore completes before the handle is returned, so no
    /// mutation-triggered persist can race ahead of it. When the store is
    /// not yet in the registry, it is registered and subscribed to the
    /// mutation feed, watching or not according to `options`.
    pub async fn attach(
        store: Arc<StateStore>,
        options: PersistOptions,
        persister: Arc<Persister>,
        cipher: Option<Arc<CipherService>>,
        watched: WatchedStores,
        mutation_callback: Option<MutationCallback>,
    ) -> PersistResult<Arc<Self>> {
        let policy = PersistencePolicy::from_options(&options);

        if !store.contains_key(IS_LOADING_KEY).await {
            store.set(IS_LOADING_KEY, Value::Bool(false)).await;
        }

        let orchestrator = Arc::new(Self {
            store,
            persister,
            cipher,
            policy,
            watched,
            mutation_callback,
            watch_mutation: AtomicBool::new(false),
            is_encrypted: AtomicBool::new(options.is_encrypted),
            subscribed: AtomicBool::new(false),
        });

        orchestrator.remember().await?;

        if !orchestrator.watched.contains(orchestrator.store.id()) {
            orchestrator.watched.insert(orchestrator.store.id());
            orchestrator
                .watch_mutation
                .store(options.watch_mutation, Ordering::SeqCst);
            orchestrator.spawn_feed_task();
        }

        Ok(orchestrator)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn is_watching(&self) -> bool {
        self.watch_mutation.load(Ordering::SeqCst)
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted.load(Ordering::SeqCst)
    }

    /// The persistable subset of live state: denied-prefix and excluded
    /// keys are skipped, empty values are omitted, and fields designated
    /// for encryption are replaced by their ciphertext.
    pub async fn state_to_persist(&self) -> PersistResult<Map<String, Value>> {
        self.persistable_state().await.map(|(state, _)| state)
    }

    /// Persistable subset plus whether any field actually ended up as
    /// ciphertext in it
    async fn persistable_state(&self) -> PersistResult<(Map<String, Value>, bool)> {
        let state = self.store.snapshot().await;

        if let Some(cipher) = self.cipher_in_use() {
            cipher.init().await.map_err(PersistError::from)?;
        }

        let mut persistable = Map::new();
        let mut encrypted_any = false;
        for (key, value) in state {
            match self.policy.field_policy(&key) {
                FieldPolicy::Skip => continue,
                _ if is_empty_value(&value) => continue,
                FieldPolicy::Plain => {
                    persistable.insert(key, value);
                }
                FieldPolicy::Encrypted => match (self.cipher.as_ref(), value) {
                    (Some(cipher), Value::String(plaintext)) => {
                        let token = cipher.encrypt(&plaintext).await?;
                        persistable.insert(key, Value::String(token));
                        encrypted_any = true;
                    }
                    (Some(_), other) => {
                        warn!(
                            store = %self.store.id(),
                            field = %key,
                            "only string fields are encrypted; persisting plain"
                        );
                        persistable.insert(key, other);
                    }
                    // No cipher configured: the selection degrades to plain.
                    (None, other) => {
                        persistable.insert(key, other);
                    }
                },
            }
        }

        Ok((persistable, encrypted_any))
    }

    /// Compute the persistable subset and write it through the persister.
    /// Empty subsets are not written.
    pub async fn persist_state(&self) -> PersistResult<()> {
        let (state, encrypted_any) = self.persistable_state().await?;

        if state.is_empty() {
            debug!(store = %self.store.id(), "nothing persistable, skipping write");
            return Ok(());
        }

        self.persister
            .set_item(self.store.id(), Value::Object(state))
            .await;
        self.is_encrypted.store(encrypted_any, Ordering::SeqCst);

        Ok(())
    }

    /// Restore persisted state into the live store.
    ///
    /// Decrypts the encryption selection whenever a cipher is configured,
    /// then merges everything as one atomic patch. A missing snapshot
    /// leaves live state untouched. Authentication failures abort the
    /// restore; a tampered payload is never merged as plaintext.
    pub async fn remember(&self) -> PersistResult<()> {
        self.store.set(IS_LOADING_KEY, Value::Bool(true)).await;
        let result = self.restore().await;
        self.store.set(IS_LOADING_KEY, Value::Bool(false)).await;
        result
    }

    async fn restore(&self) -> PersistResult<()> {
        let persisted = match self.persister.get_item(self.store.id()).await {
            Some(Value::Object(map)) if !map.is_empty() => map,
            Some(_) | None => {
                debug!(store = %self.store.id(), "no persisted state, first-run semantics");
                return Ok(());
            }
        };

        let mut state = persisted;
        if let Some(cipher) = self.cipher_in_use() {
            cipher.init().await.map_err(PersistError::from)?;
            for field in self.policy.encrypted_fields() {
                let token = match state.get(field) {
                    Some(Value::String(token)) => token.clone(),
                    _ => continue,
                };
                match cipher.decrypt(&token).await {
                    Ok(plaintext) => {
                        state.insert(field.clone(), Value::String(plaintext));
                    }
                    // Not a cipher token: the field was persisted plain
                    // (before encryption was configured). Kept as-is.
                    Err(CipherError::MalformedToken(_)) => {
                        debug!(
                            store = %self.store.id(),
                            field = %field,
                            "selected field is not a cipher token, restoring as-is"
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            self.is_encrypted.store(false, Ordering::SeqCst);
        }

        self.store.patch(state).await;
        Ok(())
    }

    /// Start live-persisting this store. Idempotent: registry membership
    /// and the subscription guard make repeated calls harmless.
    pub fn watch(self: &Arc<Self>) {
        if !self.watched.contains(self.store.id()) {
            self.watched.insert(self.store.id());
        }
        self.watch_mutation.store(true, Ordering::SeqCst);
        self.spawn_feed_task();
    }

    /// Stop live-persisting. The feed subscription stays up; the cleared
    /// flag turns the handler into a no-op.
    pub fn stop_watch(&self) {
        if self.watch_mutation.swap(false, Ordering::SeqCst) {
            self.watched.remove(self.store.id());
        }
    }

    /// Delete the persisted record; subsequent restores see first-run
    /// semantics again
    pub async fn remove_persisted_state(&self) {
        self.persister.remove_item(self.store.id()).await;
    }

    async fn on_mutation(&self, mutation: &Mutation) {
        // Bulk patches are how restored state is applied; echoing them back
        // into persistence would amplify writes forever.
        if mutation.kind == MutationKind::PatchObject || !self.is_watching() {
            return;
        }

        if let Err(e) = self.persist_state().await {
            error!(store = %self.store.id(), error = %e, "mutation-triggered persist failed");
            return;
        }

        if let Some(callback) = &self.mutation_callback {
            let state = self.store.snapshot().await;
            callback(&state, mutation);
        }
    }

    fn spawn_feed_task(self: &Arc<Self>) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        let mut feed = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(mutation) => this.on_mutation(&mutation).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(store = %this.store.id(), skipped, "mutation feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// The cipher, when one is configured and any field is selected
    fn cipher_in_use(&self) -> Option<&Arc<CipherService>> {
        if self.policy.wants_encryption() {
            self.cipher.as_ref()
        } else {
            None
        }
    }
}
