//! Process-wide registry of per-collection serialization locks.
//!
//! Cache Store instances for the same collection must share one `CollectionLockRegistry`
//! so ledger reads/writes and pushes serialize across instances, not just within one —
//! the registry is the "mutual-exclusion primitive keyed by collection name" the
//! concurrency model calls for. Cross-collection operations never contend: each
//! collection gets its own lock, created lazily on first use.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
pub struct CollectionLockRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_collection_returns_the_same_lock() {
        let registry = CollectionLockRegistry::new();
        let a = registry.get("widgets");
        let b = registry.get("widgets");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_collections_get_independent_locks() {
        let registry = CollectionLockRegistry::new();
        let a = registry.get("widgets");
        let b = registry.get("gadgets");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
