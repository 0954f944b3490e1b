//! MMR-windowed pair matchmaking.
//!
//! Candidates are held in insertion order; the oldest candidate therefore
//! participates in the first match it is compatible with. The acceptable
//! MMR delta widens as candidates wait, by `expansion_per_second` times the
//! shorter of the two wait times.

use std::time::Instant;

use crate::config::MatchRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    pub party_id: u64,
    pub mmr: i32,
    pub party_size: usize,
    pub enqueue_time: Instant,
}

#[derive(Debug)]
pub struct MatchQueue {
    rule: MatchRule,
    queue: Vec<MatchCandidate>,
}

impl MatchQueue {
    pub fn new(rule: MatchRule) -> Self {
        Self {
            rule,
            queue: Vec::new(),
        }
    }

    /// Adds a candidate. Re-enqueueing a party replaces its entry in place;
    /// party id 0 and out-of-range party sizes are rejected.
    pub fn enqueue(&mut self, candidate: MatchCandidate) -> bool {
        if candidate.party_id == 0 {
            return false;
        }
        if candidate.party_size < self.rule.min_party_size
            || candidate.party_size > self.rule.max_party_size
        {
            return false;
        }

        if let Some(existing) = self
            .queue
            .iter_mut()
            .find(|entry| entry.party_id == candidate.party_id)
        {
            *existing = candidate;
            return true;
        }
        self.queue.push(candidate);
        true
    }

    /// Removes a party's entry, if present.
    pub fn cancel(&mut self, party_id: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.party_id != party_id);
        self.queue.len() != before
    }

    /// Refreshes a queued party's size. A size outside the rule's range
    /// drops the entry instead.
    pub fn update_party_size(&mut self, party_id: u64, party_size: usize, now: Instant) -> bool {
        let Some(index) = self
            .queue
            .iter()
            .position(|entry| entry.party_id == party_id)
        else {
            return false;
        };
        if party_size < self.rule.min_party_size || party_size > self.rule.max_party_size {
            self.queue.remove(index);
            return true;
        }
        self.queue[index].party_size = party_size;
        self.queue[index].enqueue_time = now;
        true
    }

    /// Returns the first compatible pair in `(i, j > i)` index order and
    /// removes both from the queue.
    pub fn find_match(&mut self, now: Instant) -> Option<(MatchCandidate, MatchCandidate)> {
        for i in 0..self.queue.len() {
            for j in (i + 1)..self.queue.len() {
                if self.compatible(&self.queue[i], &self.queue[j], now) {
                    let first = self.queue[i];
                    let second = self.queue[j];
                    // Remove the higher index first so the lower stays valid.
                    self.queue.remove(j);
                    self.queue.remove(i);
                    return Some((first, second));
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn compatible(&self, first: &MatchCandidate, second: &MatchCandidate, now: Instant) -> bool {
        let size_ok = |size: usize| {
            size >= self.rule.min_party_size && size <= self.rule.max_party_size
        };
        if !size_ok(first.party_size) || !size_ok(second.party_size) {
            return false;
        }

        let wait_first = now.saturating_duration_since(first.enqueue_time).as_secs_f64();
        let wait_second = now.saturating_duration_since(second.enqueue_time).as_secs_f64();
        let wait_seconds = wait_first.min(wait_second);
        let allowed_delta = self.rule.max_mmr_delta
            + (f64::from(self.rule.expansion_per_second) * wait_seconds) as i32;
        (first.mmr - second.mmr).abs() <= allowed_delta
    }
}
