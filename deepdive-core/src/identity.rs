//! Long-lived anonymous visitor identity

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::id::generate_id;
use crate::storage::StorageBackend;

/// Storage key for the visitor id
pub const IDENTITY_KEY: &str = "dd_uid";

/// How long the visitor id cookie lives
pub fn identity_ttl() -> Duration {
    Duration::days(365)
}

/// Resolves the visitor id, creating and persisting it on first use.
pub struct IdentityResolver {
    storage: Arc<StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl IdentityResolver {
    pub fn new(storage: Arc<StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Return the stored visitor id, generating one if none is stored.
    pub fn resolve(&self) -> String {
        if let Some(id) = self.storage.get(IDENTITY_KEY) {
            return id;
        }

        let id = generate_id(self.clock.now());
        self.storage.set(IDENTITY_KEY, &id, Some(identity_ttl()));
        tracing::debug!(user_id = %id, "Created visitor id");
        id
    }

    /// The stored visitor id, without creating one
    pub fn peek(&self) -> Option<String> {
        self.storage.get(IDENTITY_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::storage::{MemoryStore, StorageTier};

    fn resolver(store: &MemoryStore) -> IdentityResolver {
        let storage = StorageBackend::new(vec![Box::new(store.clone())]);
        IdentityResolver::new(Arc::new(storage), Arc::new(SystemClock))
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let store = MemoryStore::new();
        let identity = resolver(&store);

        assert_eq!(identity.peek(), None);
        let first = identity.resolve();
        for _ in 0..5 {
            assert_eq!(identity.resolve(), first);
        }
        assert_eq!(store.get(IDENTITY_KEY).unwrap(), Some(first.clone()));

        // A fresh resolver over the same storage sees the same visitor
        assert_eq!(resolver(&store).resolve(), first);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let store = MemoryStore::new();
        store.set(IDENTITY_KEY, "existing-visitor", None).unwrap();

        assert_eq!(resolver(&store).resolve(), "existing-visitor");
    }
}
