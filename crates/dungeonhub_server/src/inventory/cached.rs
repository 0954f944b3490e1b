//! Write-through cached inventory store.
//!
//! Composes a persistent store with a cache store. Reads hit the cache
//! first and backfill it on a miss. Writes land on the persistent store
//! first; a successful write is replayed on the cache, and a cache write
//! failure triggers a refresh from the persistent store so the layers stay
//! coherent. Transactions bracket both layers; the change log is always
//! served from the persistent layer.
//!
//! One outer lock covers every operation so a concurrent reader can never
//! observe a half-updated persistent/cache pair.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{
    InventoryChange, InventoryId, InventoryState, InventoryStorage, ItemId, Quantity, Transaction,
    TransactionId,
};

#[derive(Debug, Clone, Copy)]
struct TransactionPair {
    persistent: Transaction,
    cache: Transaction,
}

struct CachedInner {
    next_transaction_id: TransactionId,
    transactions: HashMap<TransactionId, TransactionPair>,
    persistent: Box<dyn InventoryStorage>,
    cache: Box<dyn InventoryStorage>,
}

impl CachedInner {
    fn refresh_cache(&self, inventory_id: InventoryId) {
        if let Some(persisted) = self.persistent.load_inventory(inventory_id) {
            self.cache.save_inventory(&persisted);
        }
    }
}

pub struct CachedInventoryStorage {
    inner: Mutex<CachedInner>,
}

impl CachedInventoryStorage {
    pub fn new(persistent: Box<dyn InventoryStorage>, cache: Box<dyn InventoryStorage>) -> Self {
        Self {
            inner: Mutex::new(CachedInner {
                next_transaction_id: 1,
                transactions: HashMap::new(),
                persistent,
                cache,
            }),
        }
    }
}

impl InventoryStorage for CachedInventoryStorage {
    fn begin_transaction(&self) -> Transaction {
        let mut inner = self.inner.lock();
        let transaction_id = inner.next_transaction_id;
        inner.next_transaction_id += 1;
        let pair = TransactionPair {
            persistent: inner.persistent.begin_transaction(),
            cache: inner.cache.begin_transaction(),
        };
        inner.transactions.insert(transaction_id, pair);
        Transaction { transaction_id }
    }

    fn commit_transaction(&self, transaction: &Transaction) {
        let mut inner = self.inner.lock();
        let Some(pair) = inner.transactions.remove(&transaction.transaction_id) else {
            return;
        };
        inner.persistent.commit_transaction(&pair.persistent);
        inner.cache.commit_transaction(&pair.cache);
    }

    fn rollback_transaction(&self, transaction: &Transaction) {
        let mut inner = self.inner.lock();
        let Some(pair) = inner.transactions.remove(&transaction.transaction_id) else {
            return;
        };
        inner.persistent.rollback_transaction(&pair.persistent);
        inner.cache.rollback_transaction(&pair.cache);
    }

    fn load_inventory(&self, inventory_id: InventoryId) -> Option<InventoryState> {
        let inner = self.inner.lock();
        if let Some(cached) = inner.cache.load_inventory(inventory_id) {
            return Some(cached);
        }
        let persisted = inner.persistent.load_inventory(inventory_id)?;
        inner.cache.save_inventory(&persisted);
        Some(persisted)
    }

    fn save_inventory(&self, state: &InventoryState) {
        let inner = self.inner.lock();
        inner.persistent.save_inventory(state);
        inner.cache.save_inventory(state);
    }

    fn add_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        let inner = self.inner.lock();
        if !inner.persistent.add_item(inventory_id, item_id, quantity, reason) {
            return false;
        }
        if !inner.cache.add_item(inventory_id, item_id, quantity, reason) {
            inner.refresh_cache(inventory_id);
        }
        true
    }

    fn remove_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        let inner = self.inner.lock();
        if !inner
            .persistent
            .remove_item(inventory_id, item_id, quantity, reason)
        {
            return false;
        }
        if !inner.cache.remove_item(inventory_id, item_id, quantity, reason) {
            inner.refresh_cache(inventory_id);
        }
        true
    }

    fn set_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) {
        let inner = self.inner.lock();
        inner.persistent.set_item(inventory_id, item_id, quantity, reason);
        inner.cache.set_item(inventory_id, item_id, quantity, reason);
    }

    fn change_log(&self, inventory_id: InventoryId) -> Vec<InventoryChange> {
        self.inner.lock().persistent.change_log(inventory_id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::InMemoryInventoryStorage;
    use super::*;

    fn cached_store() -> CachedInventoryStorage {
        CachedInventoryStorage::new(
            Box::new(InMemoryInventoryStorage::new()),
            Box::new(InMemoryInventoryStorage::new()),
        )
    }

    #[test]
    fn writes_reach_both_layers() {
        let store = cached_store();
        assert!(store.add_item(1, 100, 5, "test"));
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);

        let inner = store.inner.lock();
        assert_eq!(inner.persistent.load_inventory(1).unwrap().items[&100], 5);
        assert_eq!(inner.cache.load_inventory(1).unwrap().items[&100], 5);
    }

    #[test]
    fn read_miss_backfills_cache() {
        let persistent = Box::new(InMemoryInventoryStorage::new());
        persistent.add_item(1, 100, 5, "seed");
        let store = CachedInventoryStorage::new(persistent, Box::new(InMemoryInventoryStorage::new()));

        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);
        let inner = store.inner.lock();
        assert_eq!(inner.cache.load_inventory(1).unwrap().items[&100], 5);
    }

    #[test]
    fn persistent_failure_fails_the_write() {
        let store = cached_store();
        // Nothing to remove: the persistent layer refuses, nothing changes.
        assert!(!store.remove_item(1, 100, 1, "test"));
        assert!(store.change_log(1).is_empty());
    }

    #[test]
    fn cache_divergence_is_repaired_from_persistent() {
        let persistent = Box::new(InMemoryInventoryStorage::new());
        persistent.add_item(1, 100, 5, "seed");
        let cache = Box::new(InMemoryInventoryStorage::new());
        // Cache does not know about item 100 yet, so its remove fails and
        // the cached store refreshes it from the persistent layer.
        let store = CachedInventoryStorage::new(persistent, cache);

        assert!(store.remove_item(1, 100, 2, "test"));
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 3);
        let inner = store.inner.lock();
        assert_eq!(inner.cache.load_inventory(1).unwrap().items[&100], 3);
    }

    #[test]
    fn transactions_bracket_both_layers() {
        let store = cached_store();
        store.add_item(1, 100, 5, "seed");

        let tx = store.begin_transaction();
        store.add_item(1, 100, 10, "inside");
        store.set_item(1, 200, 3, "inside");
        store.rollback_transaction(&tx);

        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);
        assert!(store.load_inventory(1).unwrap().items.get(&200).is_none());
        let inner = store.inner.lock();
        assert_eq!(inner.cache.load_inventory(1).unwrap().items[&100], 5);
    }

    #[test]
    fn change_log_comes_from_persistent() {
        let store = cached_store();
        store.add_item(1, 100, 5, "a");
        store.add_item(1, 100, 5, "b");
        let log = store.change_log(1);
        assert_eq!(log.len(), 2);

        let inner = store.inner.lock();
        assert_eq!(inner.persistent.change_log(1).len(), 2);
    }

    #[test]
    fn unknown_transaction_handles_are_ignored() {
        let store = cached_store();
        store.add_item(1, 100, 5, "seed");
        store.commit_transaction(&Transaction { transaction_id: 42 });
        store.rollback_transaction(&Transaction { transaction_id: 42 });
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);
    }
}
