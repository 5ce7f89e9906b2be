//! Live state container and mutation feed
//!
//! The host application owns the state; the persistence pipeline only needs
//! three things from it: a snapshot of the current properties, an atomic
//! bulk-patch operation, and a feed of mutation notifications. `StateStore`
//! provides exactly that surface and nothing else, so orchestrators are
//! wired by passing a handle instead of extending a framework base type.

mod mutation;

pub use mutation::{Mutation, MutationKind};

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the mutation broadcast channel. Slow subscribers observe a
/// lag error and skip ahead rather than blocking writers.
const FEED_CAPACITY: usize = 64;

/// A named, ordered key-value state map with a mutation broadcast feed
pub struct StateStore {
    id: String,
    state: RwLock<Map<String, Value>>,
    feed: broadcast::Sender<Mutation>,
}

impl StateStore {
    /// Create a store with an initial set of properties
    pub fn new(id: impl Into<String>, initial: Map<String, Value>) -> Arc<Self> {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Arc::new(Self {
            id: id.into(),
            state: RwLock::new(initial),
            feed,
        })
    }

    /// Store identifier, used as the persistence key
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value of a single property
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.read().await.get(key).cloned()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.state.read().await.contains_key(key)
    }

    /// Set a single property and notify subscribers of a direct mutation
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        {
            let mut state = self.state.write().await;
            state.insert(key.into(), value);
        }
        self.notify(MutationKind::Direct);
    }

    /// Merge a set of properties into the state as one atomic patch.
    ///
    /// Subscribers are notified with [`MutationKind::PatchObject`]; this is
    /// the vector used to apply restored state, and the orchestrator ignores
    /// it to avoid write amplification.
    pub async fn patch(&self, patch: Map<String, Value>) {
        {
            let mut state = self.state.write().await;
            for (key, value) in patch {
                state.insert(key, value);
            }
        }
        self.notify(MutationKind::PatchObject);
    }

    /// Copy of the full state map
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.state.read().await.clone()
    }

    /// Subscribe to the mutation feed
    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.feed.subscribe()
    }

    fn notify(&self, kind: MutationKind) {
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.feed.send(Mutation {
            store_id: self.id.clone(),
            kind,
        });
    }
}
