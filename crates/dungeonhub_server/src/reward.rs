//! At-most-once reward grants.
//!
//! [`RewardLedger`] is the ephemeral, capacity-bounded item map the
//! dispatcher uses to enforce grant idempotence before touching durable
//! storage. Grant states latch: once `Completed`, a grant id can never be
//! applied again. [`RewardService::grant_rewards_detailed`] applies a
//! multi-item grant atomically, rolling applied items back in reverse on
//! the first failure.

use std::collections::HashMap;

use rand::Rng;

pub type GrantId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrantStatus {
    #[default]
    None,
    Pending,
    Completed,
    Failed,
}

/// Outcome of a detailed grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Completed,
    Duplicate,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardItem {
    pub item_id: u32,
    pub quantity: u32,
}

/// Ephemeral inventory with latched grant bookkeeping.
#[derive(Debug)]
pub struct RewardLedger {
    capacity: usize,
    items: HashMap<u32, u32>,
    grant_status: HashMap<GrantId, GrantStatus>,
}

impl Default for RewardLedger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RewardLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: HashMap::new(),
            grant_status: HashMap::new(),
        }
    }

    /// Marks a grant `Pending`. Fails if the grant is already pending or
    /// completed; a failed grant may be retried.
    pub fn begin_grant(&mut self, grant_id: GrantId) -> bool {
        let status = self.grant_status.entry(grant_id).or_default();
        if matches!(status, GrantStatus::Pending | GrantStatus::Completed) {
            return false;
        }
        *status = GrantStatus::Pending;
        true
    }

    pub fn commit_grant(&mut self, grant_id: GrantId) {
        self.grant_status.insert(grant_id, GrantStatus::Completed);
    }

    pub fn fail_grant(&mut self, grant_id: GrantId) {
        self.grant_status.insert(grant_id, GrantStatus::Failed);
    }

    /// Adds a stack. Fails on zero quantity or when the total would exceed
    /// the ledger capacity.
    pub fn add_item(&mut self, item_id: u32, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        if self.total_quantity() + quantity as usize > self.capacity {
            return false;
        }
        *self.items.entry(item_id).or_insert(0) += quantity;
        true
    }

    /// Removes up to `quantity` of a stack; the key disappears at zero.
    pub fn remove_item(&mut self, item_id: u32, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let Some(current) = self.items.get_mut(&item_id) else {
            return;
        };
        if *current <= quantity {
            self.items.remove(&item_id);
        } else {
            *current -= quantity;
        }
    }

    pub fn grant_status(&self, grant_id: GrantId) -> GrantStatus {
        self.grant_status
            .get(&grant_id)
            .copied()
            .unwrap_or(GrantStatus::None)
    }

    pub fn total_quantity(&self) -> usize {
        self.items.values().map(|&q| q as usize).sum()
    }

    pub fn items(&self) -> &HashMap<u32, u32> {
        &self.items
    }
}

/// One row of a drop table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropEntry {
    pub item_id: u32,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub probability: f32,
}

/// Probability-weighted reward rolls, keyed by table id.
#[derive(Debug, Default)]
pub struct DropTable {
    tables: HashMap<u32, Vec<DropEntry>>,
}

impl DropTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, table_id: u32, entry: DropEntry) {
        self.tables.entry(table_id).or_default().push(entry);
    }

    pub fn has_table(&self, table_id: u32) -> bool {
        self.tables.contains_key(&table_id)
    }

    /// Rolls every entry of a table independently. A missing table yields
    /// nothing.
    pub fn roll(&self, table_id: u32, rng: &mut impl Rng) -> Vec<RewardItem> {
        let Some(entries) = self.tables.get(&table_id) else {
            return Vec::new();
        };
        let mut rewards = Vec::new();
        for entry in entries {
            if rng.gen::<f32>() >= entry.probability {
                continue;
            }
            let quantity = if entry.max_quantity > entry.min_quantity {
                rng.gen_range(entry.min_quantity..=entry.max_quantity)
            } else {
                entry.min_quantity
            };
            if quantity > 0 {
                rewards.push(RewardItem {
                    item_id: entry.item_id,
                    quantity,
                });
            }
        }
        rewards
    }
}

/// Applies reward grants against a [`RewardLedger`].
#[derive(Debug, Default)]
pub struct RewardService {
    drop_table: DropTable,
}

impl RewardService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `items` under `grant_id`, at most once.
    ///
    /// On the first item that fails to apply, every already-applied item is
    /// removed in reverse order, the grant is latched `Failed`, and the
    /// ledger is byte-identical to its pre-call state.
    pub fn grant_rewards_detailed(
        &self,
        ledger: &mut RewardLedger,
        grant_id: GrantId,
        items: &[RewardItem],
    ) -> GrantOutcome {
        if !ledger.begin_grant(grant_id) {
            return GrantOutcome::Duplicate;
        }

        let mut applied: Vec<RewardItem> = Vec::with_capacity(items.len());
        for item in items {
            if !ledger.add_item(item.item_id, item.quantity) {
                for rollback in applied.iter().rev() {
                    ledger.remove_item(rollback.item_id, rollback.quantity);
                }
                ledger.fail_grant(grant_id);
                return GrantOutcome::Failed;
            }
            applied.push(*item);
        }

        ledger.commit_grant(grant_id);
        GrantOutcome::Completed
    }

    /// Boolean convenience over [`grant_rewards_detailed`](Self::grant_rewards_detailed).
    pub fn grant_rewards(
        &self,
        ledger: &mut RewardLedger,
        grant_id: GrantId,
        items: &[RewardItem],
    ) -> bool {
        self.grant_rewards_detailed(ledger, grant_id, items) == GrantOutcome::Completed
    }

    /// Rolls a drop table and grants the result.
    pub fn grant_from_table(
        &self,
        ledger: &mut RewardLedger,
        grant_id: GrantId,
        table_id: u32,
        rng: &mut impl Rng,
    ) -> bool {
        let rewards = self.drop_table.roll(table_id, rng);
        self.grant_rewards(ledger, grant_id, &rewards)
    }

    pub fn drop_table(&self) -> &DropTable {
        &self.drop_table
    }

    pub fn drop_table_mut(&mut self) -> &mut DropTable {
        &mut self.drop_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn completed_grant_is_latched() {
        let service = RewardService::new();
        let mut ledger = RewardLedger::default();
        let items = [RewardItem {
            item_id: 501,
            quantity: 1,
        }];

        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 1, &items),
            GrantOutcome::Completed
        );
        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 1, &items),
            GrantOutcome::Duplicate
        );
        // Idempotent: inventory equals the single-grant state.
        assert_eq!(ledger.items().get(&501), Some(&1));
        assert_eq!(ledger.grant_status(1), GrantStatus::Completed);
    }

    #[test]
    fn failed_grant_rolls_back_in_reverse() {
        let service = RewardService::new();
        let mut ledger = RewardLedger::new(10);
        assert!(ledger.add_item(100, 4));

        let items = [
            RewardItem {
                item_id: 501,
                quantity: 3,
            },
            RewardItem {
                item_id: 502,
                quantity: 5,
            },
        ];
        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 7, &items),
            GrantOutcome::Failed
        );
        // Pre-call state restored exactly.
        assert_eq!(ledger.items().len(), 1);
        assert_eq!(ledger.items().get(&100), Some(&4));
        assert_eq!(ledger.grant_status(7), GrantStatus::Failed);
    }

    #[test]
    fn failed_grant_may_retry() {
        let service = RewardService::new();
        let mut ledger = RewardLedger::new(2);
        let too_big = [RewardItem {
            item_id: 1,
            quantity: 5,
        }];
        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 3, &too_big),
            GrantOutcome::Failed
        );

        let fits = [RewardItem {
            item_id: 1,
            quantity: 2,
        }];
        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 3, &fits),
            GrantOutcome::Completed
        );
    }

    #[test]
    fn zero_quantity_item_fails_the_grant() {
        let service = RewardService::new();
        let mut ledger = RewardLedger::default();
        let items = [
            RewardItem {
                item_id: 1,
                quantity: 2,
            },
            RewardItem {
                item_id: 2,
                quantity: 0,
            },
        ];
        assert_eq!(
            service.grant_rewards_detailed(&mut ledger, 1, &items),
            GrantOutcome::Failed
        );
        assert!(ledger.items().is_empty());
    }

    #[test]
    fn ledger_remove_clamps_and_clears() {
        let mut ledger = RewardLedger::default();
        assert!(ledger.add_item(1, 5));
        ledger.remove_item(1, 2);
        assert_eq!(ledger.items().get(&1), Some(&3));
        ledger.remove_item(1, 10);
        assert!(ledger.items().get(&1).is_none());
        // Removing a missing item is a no-op.
        ledger.remove_item(9, 1);
    }

    #[test]
    fn drop_table_rolls_within_bounds() {
        let mut service = RewardService::new();
        service.drop_table_mut().add_entry(
            10,
            DropEntry {
                item_id: 501,
                min_quantity: 1,
                max_quantity: 3,
                probability: 1.0,
            },
        );
        service.drop_table_mut().add_entry(
            10,
            DropEntry {
                item_id: 502,
                min_quantity: 1,
                max_quantity: 1,
                probability: 0.0,
            },
        );

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let rewards = service.drop_table().roll(10, &mut rng);
            assert_eq!(rewards.len(), 1);
            assert_eq!(rewards[0].item_id, 501);
            assert!((1..=3).contains(&rewards[0].quantity));
        }
        assert!(service.drop_table().roll(99, &mut rng).is_empty());
    }

    #[test]
    fn grant_from_table_deposits_rolled_items() {
        let mut service = RewardService::new();
        service.drop_table_mut().add_entry(
            1,
            DropEntry {
                item_id: 900,
                min_quantity: 2,
                max_quantity: 2,
                probability: 1.0,
            },
        );
        let mut ledger = RewardLedger::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(service.grant_from_table(&mut ledger, 5, 1, &mut rng));
        assert_eq!(ledger.items().get(&900), Some(&2));
    }
}
