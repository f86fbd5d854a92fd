//! Transaction: an ordered set of splits forming one balanced event.
//!
//! By convention, and only by convention, the first split is the source
//! (crediting) split and the others are destination (debiting) splits. The
//! grand total of all splits is kept at zero by the rebalancer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use splitbook_common::{
    normalize, sum_amounts, AccountId, Amount, LedgerError, Result, SplitId, Timestamp,
    TransactionId,
};

use crate::split::Split;

/// One balanced economic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    /// When the register entry was made.
    date_entered: Timestamp,
    /// When the transaction took effect at the bank.
    date_posted: Timestamp,
    num: String,
    description: String,
    splits: Vec<Split>,
    /// Set only while the transaction is mid-write (batch load).
    write_flag: bool,
    /// Set while the transaction is opened for editing.
    open: bool,
}

impl Transaction {
    /// Create an empty transaction, opened for editing.
    pub fn new() -> Self {
        let now = splitbook_common::now();
        Self {
            id: TransactionId::new(),
            date_entered: now,
            date_posted: now,
            num: String::new(),
            description: String::new(),
            splits: Vec::new(),
            write_flag: false,
            open: true,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn date_entered(&self) -> Timestamp {
        self.date_entered
    }

    pub fn date_posted(&self) -> Timestamp {
        self.date_posted
    }

    pub fn num(&self) -> &str {
        &self.num
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn write_flag(&self) -> bool {
        self.write_flag
    }

    pub fn set_date_entered(&mut self, date: Timestamp) {
        self.date_entered = date;
    }

    /// Set the posted date, returning the previous one.
    pub fn set_date_posted(&mut self, date: Timestamp) -> Timestamp {
        std::mem::replace(&mut self.date_posted, date)
    }

    pub fn set_num(&mut self, num: impl Into<String>) {
        self.num = num.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_write_flag(&mut self, flag: bool) {
        self.write_flag = flag;
    }

    /// Open the transaction for editing.
    pub fn begin_edit(&mut self) {
        self.open = true;
    }

    /// Close the editing session.
    pub fn commit_edit(&mut self) {
        self.open = false;
    }

    /// Splits in insertion order.
    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// The source split (index 0), if any.
    pub fn source(&self) -> Option<&Split> {
        self.splits.first()
    }

    /// Every split after the source.
    pub fn destinations(&self) -> &[Split] {
        self.splits.get(1..).unwrap_or(&[])
    }

    pub fn position(&self, split_id: SplitId) -> Option<usize> {
        self.splits.iter().position(|s| s.id() == split_id)
    }

    pub fn contains(&self, split_id: SplitId) -> bool {
        self.position(split_id).is_some()
    }

    pub fn split(&self, split_id: SplitId) -> Option<&Split> {
        self.splits.iter().find(|s| s.id() == split_id)
    }

    pub fn split_mut(&mut self, split_id: SplitId) -> Option<&mut Split> {
        if !self.open {
            debug!(transaction_id = %self.id, split_id = %split_id, "Editing closed transaction");
        }
        self.splits.iter_mut().find(|s| s.id() == split_id)
    }

    pub(crate) fn splits_mut(&mut self) -> &mut [Split] {
        &mut self.splits
    }

    /// Distinct accounts touched by this transaction, in split order.
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = Vec::with_capacity(self.splits.len());
        for split in &self.splits {
            if !accounts.contains(&split.account()) {
                accounts.push(split.account());
            }
        }
        accounts
    }

    /// Exact sum of all split amounts.
    pub fn total(&self) -> Result<Amount> {
        sum_amounts(self.splits.iter().map(|s| s.amount()))
    }

    /// Sum of all split amounts, folded to zero below `epsilon`.
    pub fn imbalance(&self, epsilon: Decimal) -> Result<Amount> {
        Ok(normalize(self.total()?, epsilon))
    }

    /// A total that overflows is never balanced.
    pub fn is_balanced(&self, epsilon: Decimal) -> bool {
        matches!(self.imbalance(epsilon), Ok(imbalance) if imbalance.is_zero())
    }

    /// Append a detached split, taking ownership of it.
    pub fn append_split(&mut self, mut split: Split) -> Result<SplitId> {
        if let Some(parent) = split.parent() {
            return Err(LedgerError::SplitAlreadyAttached {
                split_id: split.id(),
                parent,
            });
        }
        if self.contains(split.id()) {
            return Err(LedgerError::DuplicateSplit(split.id()));
        }
        if !self.open {
            debug!(transaction_id = %self.id, "Appending split to closed transaction");
        }

        let split_id = split.id();
        split.set_parent(Some(self.id));
        self.splits.push(split);

        Ok(split_id)
    }

    /// Detach a split from this transaction and hand it to the caller.
    ///
    /// Purely structural: no amounts are adjusted and no account is told.
    /// Callers rebalance afterwards if the zero-sum must hold immediately.
    #[must_use = "discard_split or attach_split the removed split"]
    pub fn remove_split(&mut self, split_id: SplitId) -> Result<Split> {
        let index = self
            .position(split_id)
            .ok_or(LedgerError::SplitNotInTransaction {
                split_id,
                transaction_id: self.id,
            })?;

        let mut split = self.splits.remove(index);
        split.set_parent(None);

        debug!(
            transaction_id = %self.id,
            split_id = %split_id,
            remaining = self.splits.len(),
            "Split removed"
        );

        Ok(split)
    }

    /// Release every split, leaving them detached.
    pub(crate) fn take_splits(&mut self) -> Vec<Split> {
        let mut splits = std::mem::take(&mut self.splits);
        for split in &mut splits {
            split.set_parent(None);
        }
        splits
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Free a split.
///
/// Unchecked: the caller must already have removed it from its transaction
/// and from its account's index.
pub(crate) fn destroy_split(split: Split) {
    debug_assert!(split.is_detached(), "destroying an attached split");
    trace!(split_id = %split.id(), "Split freed");
    drop(split);
}

/// Free a transaction and all of its splits.
///
/// Unchecked: the caller must already have removed every split from its
/// account's index.
pub(crate) fn destroy_transaction(mut transaction: Transaction) {
    for split in transaction.take_splits() {
        destroy_split(split);
    }
    trace!(transaction_id = %transaction.id, "Transaction freed");
}
