//! Per-user bounded purchase histories.
//!
//! Every user keeps their own window-sized ring of purchases,
//! independent of group membership. The ledger exists solely so a
//! group's shared window can be rebuilt by replay when membership
//! changes; anomaly decisions never read it directly.

use chrono::NaiveDateTime;
use pa_common::UserId;
use pa_math::{RingBuffer, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User-id to own-purchase ring mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLedger {
    window_size: usize,
    sigma_level: u32,
    transactions: BTreeMap<UserId, RingBuffer>,
}

impl UserLedger {
    pub fn new(window_size: usize, sigma_level: u32) -> Self {
        Self {
            window_size,
            sigma_level,
            transactions: BTreeMap::new(),
        }
    }

    /// Record a purchase into the user's own ring, creating it on first
    /// use. Returns the evicted sample once the ring is full.
    pub fn add_purchase(
        &mut self,
        uid: &UserId,
        amount: f64,
        timestamp: NaiveDateTime,
    ) -> Option<Sample> {
        let ring = self
            .transactions
            .entry(uid.clone())
            .or_insert_with(|| RingBuffer::new(self.window_size, self.sigma_level));
        ring.push(Sample::new(timestamp, amount, uid.clone()))
    }

    /// The user's buffered purchases in insertion order, if any.
    pub fn history(&self, uid: &UserId) -> Option<Vec<Sample>> {
        self.transactions.get(uid).map(|ring| ring.ordered())
    }

    pub fn user_count(&self) -> usize {
        self.transactions.len()
    }
}
