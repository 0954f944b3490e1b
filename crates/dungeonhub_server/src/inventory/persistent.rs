//! Durable inventory store.
//!
//! Stands in for the database-backed store: the real driver lives outside
//! the core, so this keeps the same snapshot-transactional state machine as
//! the in-memory store and traces every call at the driver boundary. Swap
//! the internals for a real driver without touching callers.

use tracing::trace;

use super::{
    InMemoryInventoryStorage, InventoryChange, InventoryId, InventoryState, InventoryStorage,
    ItemId, Quantity, Transaction,
};

#[derive(Debug, Default)]
pub struct PersistentInventoryStorage {
    inner: InMemoryInventoryStorage,
}

impl PersistentInventoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryStorage for PersistentInventoryStorage {
    fn begin_transaction(&self) -> Transaction {
        let transaction = self.inner.begin_transaction();
        trace!(
            event = "inventory_tx_begin",
            transaction_id = transaction.transaction_id,
            "durable transaction opened"
        );
        transaction
    }

    fn commit_transaction(&self, transaction: &Transaction) {
        trace!(
            event = "inventory_tx_commit",
            transaction_id = transaction.transaction_id,
            "durable transaction committed"
        );
        self.inner.commit_transaction(transaction);
    }

    fn rollback_transaction(&self, transaction: &Transaction) {
        trace!(
            event = "inventory_tx_rollback",
            transaction_id = transaction.transaction_id,
            "durable transaction rolled back"
        );
        self.inner.rollback_transaction(transaction);
    }

    fn load_inventory(&self, inventory_id: InventoryId) -> Option<InventoryState> {
        self.inner.load_inventory(inventory_id)
    }

    fn save_inventory(&self, state: &InventoryState) {
        self.inner.save_inventory(state);
    }

    fn add_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        self.inner.add_item(inventory_id, item_id, quantity, reason)
    }

    fn remove_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        self.inner
            .remove_item(inventory_id, item_id, quantity, reason)
    }

    fn set_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) {
        self.inner.set_item(inventory_id, item_id, quantity, reason);
    }

    fn change_log(&self, inventory_id: InventoryId) -> Vec<InventoryChange> {
        self.inner.change_log(inventory_id)
    }
}
