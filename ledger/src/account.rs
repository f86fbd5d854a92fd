//! Account registry entries.
//!
//! An account never owns splits. It keeps an index of split ids, in the order
//! they were indexed, and a pending recompute marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use splitbook_common::{earliest, AccountId, SplitId, Timestamp};

use crate::balance::RunningBalances;

/// A split reference held by an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub split_id: SplitId,
    /// Monotonic per account; tie-break for equal posted dates.
    pub sequence: u64,
}

/// A ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Account name.
    pub name: String,
    /// Overrides the book-wide forced double-entry policy when set.
    pub forced_double_entry: Option<bool>,
    entries: Vec<AccountEntry>,
    next_sequence: u64,
    /// Earliest posted date whose running balances are stale.
    dirty_from: Option<Timestamp>,
    /// Balances after the last split in date order, as of the last recompute.
    closing: RunningBalances,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            forced_double_entry: None,
            entries: Vec::new(),
            next_sequence: 0,
            dirty_from: None,
            closing: RunningBalances::default(),
            created_at: Utc::now(),
        }
    }

    /// Set the forced double-entry override (builder style).
    pub fn with_forced_double_entry(mut self, forced: Option<bool>) -> Self {
        self.forced_double_entry = forced;
        self
    }

    /// Indexed splits, in indexing order.
    pub fn entries(&self) -> &[AccountEntry] {
        &self.entries
    }

    pub fn contains(&self, split_id: SplitId) -> bool {
        self.entries.iter().any(|e| e.split_id == split_id)
    }

    /// Index a split. Indexing an already indexed split keeps its sequence.
    /// Returns whether the split was newly indexed.
    pub fn index_split(&mut self, split_id: SplitId) -> bool {
        if self.contains(split_id) {
            return false;
        }
        self.entries.push(AccountEntry {
            split_id,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        true
    }

    /// Drop a split from the index. Returns whether it was present.
    pub fn unindex_split(&mut self, split_id: SplitId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.split_id != split_id);
        before != self.entries.len()
    }

    /// Mark running balances stale from `from` onward. Coalesces with any
    /// pending notification by keeping the earlier date.
    pub fn notify_dirty(&mut self, from: Timestamp) {
        self.dirty_from = earliest(self.dirty_from, Some(from));
        trace!(account = %self.id, from = %from, "Account marked dirty");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_from.is_some()
    }

    pub fn dirty_from(&self) -> Option<Timestamp> {
        self.dirty_from
    }

    /// Clear the pending marker, returning it.
    pub(crate) fn take_dirty(&mut self) -> Option<Timestamp> {
        self.dirty_from.take()
    }

    /// Closing balances as of the last recompute.
    pub fn closing_balances(&self) -> RunningBalances {
        self.closing
    }

    pub(crate) fn set_closing_balances(&mut self, balances: RunningBalances) {
        self.closing = balances;
    }
}
