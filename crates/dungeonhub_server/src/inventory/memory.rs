//! In-memory inventory store.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::{
    ChangeId, ChangeType, InventoryChange, InventoryId, InventoryState, InventoryStorage, ItemId,
    Quantity, Transaction, TransactionId,
};

#[derive(Debug, Clone, Default)]
struct StoreSnapshot {
    inventories: HashMap<InventoryId, InventoryState>,
    change_log: HashMap<InventoryId, Vec<InventoryChange>>,
    next_change_id: ChangeId,
}

#[derive(Debug)]
struct StoreState {
    next_transaction_id: TransactionId,
    next_change_id: ChangeId,
    active_transactions: HashSet<TransactionId>,
    transaction_snapshots: HashMap<TransactionId, StoreSnapshot>,
    inventories: HashMap<InventoryId, InventoryState>,
    change_log: HashMap<InventoryId, Vec<InventoryChange>>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            next_transaction_id: 1,
            next_change_id: 1,
            active_transactions: HashSet::new(),
            transaction_snapshots: HashMap::new(),
            inventories: HashMap::new(),
            change_log: HashMap::new(),
        }
    }
}

impl StoreState {
    fn record_change(
        &mut self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        change_type: ChangeType,
        reason: &str,
    ) {
        let change = InventoryChange {
            change_id: self.next_change_id,
            inventory_id,
            item_id,
            quantity,
            change_type,
            reason: reason.to_string(),
            recorded_at: SystemTime::now(),
        };
        self.next_change_id += 1;
        self.change_log.entry(inventory_id).or_default().push(change);
    }

    fn inventory_mut(&mut self, inventory_id: InventoryId) -> &mut InventoryState {
        self.inventories
            .entry(inventory_id)
            .or_insert_with(|| InventoryState::new(inventory_id))
    }
}

/// Snapshot-transactional store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStorage {
    state: Mutex<StoreState>,
}

impl InMemoryInventoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryStorage for InMemoryInventoryStorage {
    fn begin_transaction(&self) -> Transaction {
        let mut state = self.state.lock();
        let transaction_id = state.next_transaction_id;
        state.next_transaction_id += 1;
        state.active_transactions.insert(transaction_id);
        let snapshot = StoreSnapshot {
            inventories: state.inventories.clone(),
            change_log: state.change_log.clone(),
            next_change_id: state.next_change_id,
        };
        state.transaction_snapshots.insert(transaction_id, snapshot);
        Transaction { transaction_id }
    }

    fn commit_transaction(&self, transaction: &Transaction) {
        let mut state = self.state.lock();
        state.active_transactions.remove(&transaction.transaction_id);
        state
            .transaction_snapshots
            .remove(&transaction.transaction_id);
    }

    fn rollback_transaction(&self, transaction: &Transaction) {
        let mut state = self.state.lock();
        if let Some(snapshot) = state
            .transaction_snapshots
            .remove(&transaction.transaction_id)
        {
            state.inventories = snapshot.inventories;
            state.change_log = snapshot.change_log;
            state.next_change_id = snapshot.next_change_id;
        }
        state.active_transactions.remove(&transaction.transaction_id);
    }

    fn load_inventory(&self, inventory_id: InventoryId) -> Option<InventoryState> {
        self.state.lock().inventories.get(&inventory_id).cloned()
    }

    fn save_inventory(&self, state: &InventoryState) {
        self.state
            .lock()
            .inventories
            .insert(state.inventory_id, state.clone());
    }

    fn add_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        if quantity == 0 {
            return false;
        }
        let mut state = self.state.lock();
        *state
            .inventory_mut(inventory_id)
            .items
            .entry(item_id)
            .or_insert(0) += quantity;
        state.record_change(inventory_id, item_id, quantity, ChangeType::Add, reason);
        true
    }

    fn remove_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) -> bool {
        if quantity == 0 {
            return false;
        }
        let mut state = self.state.lock();
        let inventory = state.inventory_mut(inventory_id);
        let Some(current) = inventory.items.get_mut(&item_id) else {
            return false;
        };
        if *current < quantity {
            return false;
        }
        *current -= quantity;
        if *current == 0 {
            inventory.items.remove(&item_id);
        }
        state.record_change(inventory_id, item_id, quantity, ChangeType::Remove, reason);
        true
    }

    fn set_item(
        &self,
        inventory_id: InventoryId,
        item_id: ItemId,
        quantity: Quantity,
        reason: &str,
    ) {
        let mut state = self.state.lock();
        let inventory = state.inventory_mut(inventory_id);
        if quantity == 0 {
            inventory.items.remove(&item_id);
        } else {
            inventory.items.insert(item_id, quantity);
        }
        state.record_change(inventory_id, item_id, quantity, ChangeType::Set, reason);
    }

    fn change_log(&self, inventory_id: InventoryId) -> Vec<InventoryChange> {
        self.state
            .lock()
            .change_log
            .get(&inventory_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_set_maintain_quantities() {
        let store = InMemoryInventoryStorage::new();
        assert!(store.add_item(1, 100, 5, "test"));
        assert!(store.add_item(1, 100, 3, "test"));
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 8);

        assert!(store.remove_item(1, 100, 8, "test"));
        // Key disappears at zero.
        assert!(store.load_inventory(1).unwrap().items.get(&100).is_none());

        store.set_item(1, 200, 4, "test");
        assert_eq!(store.load_inventory(1).unwrap().items[&200], 4);
        store.set_item(1, 200, 0, "test");
        assert!(store.load_inventory(1).unwrap().items.get(&200).is_none());
    }

    #[test]
    fn zero_quantity_operations_fail() {
        let store = InMemoryInventoryStorage::new();
        assert!(!store.add_item(1, 100, 0, "test"));
        assert!(!store.remove_item(1, 100, 0, "test"));
        assert!(store.change_log(1).is_empty());
    }

    #[test]
    fn remove_needs_sufficient_stock() {
        let store = InMemoryInventoryStorage::new();
        assert!(store.add_item(1, 100, 2, "test"));
        assert!(!store.remove_item(1, 100, 3, "test"));
        assert!(!store.remove_item(1, 999, 1, "test"));
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 2);
    }

    #[test]
    fn change_log_is_ordered_and_monotonic() {
        let store = InMemoryInventoryStorage::new();
        store.add_item(1, 100, 5, "first");
        store.remove_item(1, 100, 2, "second");
        store.set_item(1, 100, 9, "third");

        let log = store.change_log(1);
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].change_type, ChangeType::Add);
        assert_eq!(log[1].change_type, ChangeType::Remove);
        assert_eq!(log[2].change_type, ChangeType::Set);
        assert!(log[0].change_id < log[1].change_id && log[1].change_id < log[2].change_id);
        assert_eq!(log[0].reason, "first");
    }

    #[test]
    fn rollback_restores_snapshot_exactly() {
        let store = InMemoryInventoryStorage::new();
        store.add_item(1, 100, 5, "seed");
        let log_before = store.change_log(1);
        let state_before = store.load_inventory(1).unwrap();

        let tx = store.begin_transaction();
        store.add_item(1, 100, 10, "inside");
        store.set_item(1, 200, 7, "inside");
        store.rollback_transaction(&tx);

        assert_eq!(store.load_inventory(1).unwrap(), state_before);
        assert_eq!(store.change_log(1), log_before);

        // The change id counter rewinds too: the next change reuses the id
        // that the rolled-back change consumed.
        store.add_item(1, 100, 1, "after");
        let log_after = store.change_log(1);
        assert_eq!(
            log_after.last().unwrap().change_id,
            log_before.last().unwrap().change_id + 1
        );
    }

    #[test]
    fn commit_keeps_transactional_writes() {
        let store = InMemoryInventoryStorage::new();
        let tx = store.begin_transaction();
        store.add_item(1, 100, 5, "inside");
        store.commit_transaction(&tx);
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);
        assert_eq!(store.change_log(1).len(), 1);
    }

    #[test]
    fn rollback_of_unknown_transaction_is_a_no_op() {
        let store = InMemoryInventoryStorage::new();
        store.add_item(1, 100, 5, "seed");
        store.rollback_transaction(&Transaction { transaction_id: 99 });
        assert_eq!(store.load_inventory(1).unwrap().items[&100], 5);
    }

    #[test]
    fn save_inventory_upserts() {
        let store = InMemoryInventoryStorage::new();
        let mut state = InventoryState::new(7);
        state.items.insert(1, 2);
        store.save_inventory(&state);
        assert_eq!(store.load_inventory(7).unwrap(), state);

        state.items.insert(1, 9);
        store.save_inventory(&state);
        assert_eq!(store.load_inventory(7).unwrap().items[&1], 9);
    }
}
