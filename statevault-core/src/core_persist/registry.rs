//! Watched-store registry
//!
//! Membership is the single source of truth for "is this store currently
//! live-persisting". The registry is owned by whatever context constructs
//! orchestrators and passed to each of them explicitly; it is never global
//! state. Mutations are single, non-yielding operations, so a plain mutex
//! is enough and the guard is never held across an await point.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of store identifiers currently subscribed to mutation notifications
#[derive(Clone, Default)]
pub struct WatchedStores {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl WatchedStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, store_id: &str) -> bool {
        self.guard().contains(store_id)
    }

    pub fn insert(&self, store_id: &str) -> bool {
        self.guard().insert(store_id.to_string())
    }

    pub fn remove(&self, store_id: &str) -> bool {
        self.guard().remove(store_id)
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let watched = WatchedStores::new();
        assert!(!watched.contains("user"));

        assert!(watched.insert("user"));
        assert!(!watched.insert("user"));
        assert!(watched.contains("user"));
        assert_eq!(watched.len(), 1);

        assert!(watched.remove("user"));
        assert!(watched.is_empty());
    }

    #[test]
    fn test_clones_share_membership() {
        let watched = WatchedStores::new();
        let other = watched.clone();

        watched.insert("shared");
        assert!(other.contains("shared"));
    }
}
