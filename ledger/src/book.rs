//! The book: transactions, their split index and the account registry.
//!
//! Lock discipline: a transaction entry is never held while an account entry
//! is acquired, and never two transaction entries at once. Edits to one
//! transaction serialise on its map entry; edits to different transactions
//! run in parallel. Running-balance passes span transactions and serialise on
//! the recompute gate.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use splitbook_common::{
    AccountId, Amount, LedgerError, Result, SharePrice, SplitId, Timestamp, TransactionId,
};

use crate::account::{Account, AccountEntry};
use crate::balance::{compute_running_balances, BalanceEntry, RunningBalances};
use crate::config::LedgerConfig;
use crate::rebalance::{self, RebalanceOutcome, RebalancePolicy};
use crate::split::{ReconcileState, Split};
use crate::transaction::{self, Transaction};

/// In-process entry point to the consistency core.
pub struct Book {
    config: LedgerConfig,
    transactions: DashMap<TransactionId, Transaction>,
    /// Which transaction owns each live split.
    split_index: DashMap<SplitId, TransactionId>,
    accounts: DashMap<AccountId, Account>,
    recompute_gate: Mutex<()>,
}

impl Book {
    /// Create an empty book.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            transactions: DashMap::new(),
            split_index: DashMap::new(),
            accounts: DashMap::new(),
            recompute_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ----------------------------------------------------------------------
    // Accounts

    /// Create and register a new account.
    pub fn create_account(&self, name: impl Into<String>) -> AccountId {
        self.add_account(Account::new(name))
    }

    /// Register an account built by the caller.
    pub fn add_account(&self, account: Account) -> AccountId {
        let id = account.id;
        info!(account = %id, name = %account.name, "Account created");
        self.accounts.insert(id, account);
        id
    }

    /// Override the forced double-entry policy for rebalances whose source
    /// split lives in this account. `None` falls back to the book default.
    pub fn set_account_policy(&self, account_id: AccountId, forced: Option<bool>) -> Result<()> {
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.forced_double_entry = forced;
        Ok(())
    }

    /// Snapshot of an account.
    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        self.accounts.get(&account_id).map(|a| a.clone())
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.iter().map(|a| a.id).collect()
    }

    fn ensure_account(&self, account_id: AccountId) -> Result<()> {
        if self.accounts.contains_key(&account_id) {
            Ok(())
        } else {
            Err(LedgerError::AccountNotFound(account_id))
        }
    }

    fn mark_dirty(&self, account_id: AccountId, from: Timestamp) {
        match self.accounts.get_mut(&account_id) {
            Some(mut account) => account.notify_dirty(from),
            None => warn!(account = %account_id, "Dirty notification for unknown account"),
        }
    }

    fn index_into_account(&self, account_id: AccountId, split_id: SplitId, date: Timestamp) {
        match self.accounts.get_mut(&account_id) {
            Some(mut account) => {
                // A split coming back may have been balanced under another
                // posted date, which is no longer known.
                let from = if account.index_split(split_id) {
                    date
                } else {
                    DateTime::<Utc>::MIN_UTC
                };
                account.notify_dirty(from);
            }
            None => warn!(account = %account_id, split_id = %split_id, "Split indexed into unknown account"),
        }
    }

    fn unindex_from_account(&self, account_id: AccountId, split_id: SplitId, date: Timestamp) {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            if account.unindex_split(split_id) {
                account.notify_dirty(date);
            }
        }
    }

    // ----------------------------------------------------------------------
    // Transactions

    /// Create an empty transaction, opened for editing.
    pub fn create_transaction(&self) -> TransactionId {
        let transaction = Transaction::new();
        let id = transaction.id();
        self.transactions.insert(id, transaction);
        debug!(transaction_id = %id, "Transaction created");
        id
    }

    /// Load a fully built transaction (batch import).
    ///
    /// The write flag is raised while the splits are indexed and lowered once
    /// the transaction is visible with all of its accounts notified.
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id()))]
    pub fn load_transaction(&self, mut transaction: Transaction) -> Result<TransactionId> {
        let id = transaction.id();
        if self.transactions.contains_key(&id) {
            return Err(LedgerError::DuplicateTransaction(id));
        }
        for split in transaction.splits() {
            self.ensure_account(split.account())?;
            if self.split_index.contains_key(&split.id()) {
                return Err(LedgerError::DuplicateSplit(split.id()));
            }
        }

        transaction.set_write_flag(true);
        let date = transaction.date_posted();
        let refs: Vec<(SplitId, AccountId)> = transaction
            .splits()
            .iter()
            .map(|s| (s.id(), s.account()))
            .collect();

        for (split_id, _) in &refs {
            self.split_index.insert(*split_id, id);
        }
        self.transactions.insert(id, transaction);

        for (split_id, account_id) in refs {
            self.index_into_account(account_id, split_id, date);
        }

        if let Some(mut transaction) = self.transactions.get_mut(&id) {
            transaction.set_write_flag(false);
        }

        info!(transaction_id = %id, "Transaction loaded");
        Ok(id)
    }

    /// Snapshot of a transaction.
    pub fn transaction(&self, transaction_id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&transaction_id).map(|t| t.clone())
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|t| *t.key()).collect()
    }

    /// Open a transaction for editing.
    pub fn begin_edit(&self, transaction_id: TransactionId) -> Result<()> {
        let mut transaction = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        transaction.begin_edit();
        Ok(())
    }

    /// Close the editing session and flush pending running balances.
    pub fn commit_edit(&self, transaction_id: TransactionId) -> Result<()> {
        {
            let mut transaction = self
                .transactions
                .get_mut(&transaction_id)
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
            transaction.commit_edit();
        }

        if self.config.recompute_on_commit {
            self.recompute_dirty();
        }

        debug!(transaction_id = %transaction_id, "Transaction committed");
        Ok(())
    }

    /// Change the posted date. Every touched account is dirtied from the
    /// earlier of the old and new dates.
    pub fn set_date_posted(&self, transaction_id: TransactionId, date: Timestamp) -> Result<()> {
        let (previous, accounts) = {
            let mut transaction = self
                .transactions
                .get_mut(&transaction_id)
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
            let previous = transaction.set_date_posted(date);
            (previous, transaction.accounts())
        };

        let from = previous.min(date);
        for account_id in accounts {
            self.mark_dirty(account_id, from);
        }
        Ok(())
    }

    pub fn set_num(&self, transaction_id: TransactionId, num: impl Into<String>) -> Result<()> {
        let mut transaction = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        transaction.set_num(num);
        Ok(())
    }

    pub fn set_description(
        &self,
        transaction_id: TransactionId,
        description: impl Into<String>,
    ) -> Result<()> {
        let mut transaction = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        transaction.set_description(description);
        Ok(())
    }

    /// Current sum of a transaction's splits, folded to zero below epsilon.
    pub fn imbalance(&self, transaction_id: TransactionId) -> Result<Amount> {
        let transaction = self
            .transactions
            .get(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        transaction.imbalance(self.config.balance_epsilon)
    }

    /// Every transaction whose splits do not sum to zero. A transaction whose
    /// total overflows is logged and left out.
    pub fn unbalanced_transactions(&self) -> Vec<(TransactionId, Amount)> {
        self.transactions
            .iter()
            .filter_map(|t| match t.imbalance(self.config.balance_epsilon) {
                Ok(imbalance) => (!imbalance.is_zero()).then_some((*t.key(), imbalance)),
                Err(e) => {
                    warn!(transaction_id = %t.key(), error = %e, "Imbalance not computable");
                    None
                }
            })
            .collect()
    }

    /// Destroy a transaction and all of its splits.
    ///
    /// Every split is unindexed from its account before the transaction is
    /// freed, so no account view is left pointing at a freed split.
    #[instrument(skip(self))]
    pub fn destroy_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        let (_, transaction) = self
            .transactions
            .remove(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

        let date = transaction.date_posted();
        for split in transaction.splits() {
            self.split_index.remove(&split.id());
            self.unindex_from_account(split.account(), split.id(), date);
        }

        info!(
            transaction_id = %transaction_id,
            splits = transaction.len(),
            "Transaction destroyed"
        );
        transaction::destroy_transaction(transaction);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Splits

    fn locate(&self, split_id: SplitId) -> Result<TransactionId> {
        self.split_index
            .get(&split_id)
            .map(|t| *t)
            .ok_or(LedgerError::DanglingSplit(split_id))
    }

    /// Run `f` against a live split, returning its result along with the
    /// split's account and its transaction's posted date.
    fn edit_split<R>(
        &self,
        split_id: SplitId,
        f: impl FnOnce(&mut Split) -> R,
    ) -> Result<(R, AccountId, Timestamp)> {
        let transaction_id = self.locate(split_id)?;
        let mut transaction = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        let date = transaction.date_posted();
        let split = transaction
            .split_mut(split_id)
            .ok_or(LedgerError::SplitNotInTransaction {
                split_id,
                transaction_id,
            })?;

        let result = f(&mut *split);
        Ok((result, split.account(), date))
    }

    /// Create a split against `account_id` and append it to the transaction.
    pub fn add_split(
        &self,
        transaction_id: TransactionId,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<SplitId> {
        self.attach_split(transaction_id, Split::new(account_id).with_amount(amount))
    }

    /// Append a detached split to a transaction and index it in its account.
    pub fn attach_split(&self, transaction_id: TransactionId, split: Split) -> Result<SplitId> {
        let account_id = split.account();
        self.ensure_account(account_id)?;
        if self.split_index.contains_key(&split.id()) {
            return Err(LedgerError::DuplicateSplit(split.id()));
        }

        let (split_id, date) = {
            let mut transaction = self
                .transactions
                .get_mut(&transaction_id)
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
            let split_id = transaction.append_split(split)?;
            self.split_index.insert(split_id, transaction_id);
            (split_id, transaction.date_posted())
        };

        self.index_into_account(account_id, split_id, date);

        debug!(
            transaction_id = %transaction_id,
            split_id = %split_id,
            account = %account_id,
            "Split attached"
        );
        Ok(split_id)
    }

    /// Snapshot of a live split.
    pub fn split(&self, split_id: SplitId) -> Option<Split> {
        let transaction_id = self.locate(split_id).ok()?;
        let transaction = self.transactions.get(&transaction_id)?;
        transaction.split(split_id).cloned()
    }

    pub fn set_split_amount(&self, split_id: SplitId, amount: Amount) -> Result<()> {
        let (_, account_id, date) = self.edit_split(split_id, |s| s.set_amount(amount))?;
        self.mark_dirty(account_id, date);
        Ok(())
    }

    pub fn set_share_price(&self, split_id: SplitId, share_price: SharePrice) -> Result<()> {
        let (_, account_id, date) =
            self.edit_split(split_id, |s| s.set_share_price(share_price))?;
        self.mark_dirty(account_id, date);
        Ok(())
    }

    /// Reparent a split to another account. Returns the previous account.
    pub fn set_split_account(&self, split_id: SplitId, account_id: AccountId) -> Result<AccountId> {
        self.ensure_account(account_id)?;
        let (previous, _, date) = self.edit_split(split_id, |s| s.set_account(account_id))?;

        if previous != account_id {
            self.unindex_from_account(previous, split_id, date);
            self.index_into_account(account_id, split_id, date);
            debug!(
                split_id = %split_id,
                from = %previous,
                to = %account_id,
                "Split reparented"
            );
        }
        Ok(previous)
    }

    pub fn set_memo(&self, split_id: SplitId, memo: impl Into<String>) -> Result<()> {
        self.edit_split(split_id, |s| s.set_memo(memo))?;
        Ok(())
    }

    pub fn set_action(&self, split_id: SplitId, action: impl Into<String>) -> Result<()> {
        self.edit_split(split_id, |s| s.set_action(action))?;
        Ok(())
    }

    pub fn set_reconciled(
        &self,
        split_id: SplitId,
        state: ReconcileState,
        at: Timestamp,
    ) -> Result<()> {
        let (_, account_id, date) = self.edit_split(split_id, |s| s.set_reconciled(state, at))?;
        self.mark_dirty(account_id, date);
        Ok(())
    }

    /// Detach a split from its transaction and hand it to the caller.
    ///
    /// Structural only: the transaction is not rebalanced and the account is
    /// not notified. The account keeps its index entry until the split is
    /// discarded or attached elsewhere.
    #[must_use = "discard_split or attach_split the removed split"]
    #[instrument(skip(self))]
    pub fn remove_split(&self, transaction_id: TransactionId, split_id: SplitId) -> Result<Split> {
        let mut transaction = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        let split = transaction.remove_split(split_id)?;
        self.split_index.remove(&split_id);
        Ok(split)
    }

    /// Discard a detached split: unindex it from its account, then free it.
    #[instrument(skip(self, split), fields(split_id = %split.id()))]
    pub fn discard_split(&self, split: Split) -> Result<()> {
        if let Some(parent) = split.parent() {
            return Err(LedgerError::SplitAlreadyAttached {
                split_id: split.id(),
                parent,
            });
        }
        if let Ok(parent) = self.locate(split.id()) {
            return Err(LedgerError::SplitAlreadyAttached {
                split_id: split.id(),
                parent,
            });
        }

        // The posted date it was balanced under is gone with its transaction.
        self.unindex_from_account(split.account(), split.id(), DateTime::<Utc>::MIN_UTC);
        transaction::destroy_split(split);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Rebalancing

    /// Effective rebalance policy for a transaction: the source account's
    /// override if it has one, else the book default.
    fn policy_for(&self, transaction_id: TransactionId) -> Result<RebalancePolicy> {
        let source_account = self
            .transactions
            .get(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?
            .source()
            .map(|s| s.account());

        let account_override = source_account
            .and_then(|id| self.accounts.get(&id).and_then(|a| a.forced_double_entry));

        Ok(self.config.policy(account_override))
    }

    /// Restore the zero-sum of `split_id`'s transaction after that split changed.
    #[instrument(skip(self))]
    pub fn rebalance(&self, split_id: SplitId) -> Result<RebalanceOutcome> {
        let transaction_id = self.locate(split_id)?;
        let policy = self.policy_for(transaction_id)?;
        self.rebalance_with(transaction_id, split_id, &policy)
    }

    /// Rebalance a transaction as if its source split had been edited.
    ///
    /// This is the entry point after a removal left the edited split
    /// unreachable; a transaction with no splits left is not touched.
    #[instrument(skip(self))]
    pub fn rebalance_transaction(&self, transaction_id: TransactionId) -> Result<RebalanceOutcome> {
        let source = self
            .transactions
            .get(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?
            .source()
            .map(|s| s.id());

        match source {
            Some(split_id) => {
                let policy = self.policy_for(transaction_id)?;
                self.rebalance_with(transaction_id, split_id, &policy)
            }
            None => {
                debug!(transaction_id = %transaction_id, "Splitless transaction not rebalanced");
                Ok(RebalanceOutcome::Empty)
            }
        }
    }

    fn rebalance_with(
        &self,
        transaction_id: TransactionId,
        edited: SplitId,
        policy: &RebalancePolicy,
    ) -> Result<RebalanceOutcome> {
        let (outcome, touched, date) = {
            let mut transaction = self
                .transactions
                .get_mut(&transaction_id)
                .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

            let outcome = rebalance::rebalance(&mut transaction, edited, policy)?;

            let mut touched: Vec<AccountId> = Vec::with_capacity(2);
            let changed = std::iter::once(edited).chain(outcome.adjusted_split());
            for split_id in changed {
                if let Some(split) = transaction.split(split_id) {
                    if !touched.contains(&split.account()) {
                        touched.push(split.account());
                    }
                }
            }

            if let RebalanceOutcome::MirrorCreated { split_id, .. } = &outcome {
                self.split_index.insert(*split_id, transaction_id);
            }

            (outcome, touched, transaction.date_posted())
        };

        if let RebalanceOutcome::MirrorCreated {
            split_id, account, ..
        } = &outcome
        {
            self.index_into_account(*account, *split_id, date);
        }

        for account_id in touched {
            self.mark_dirty(account_id, date);
        }

        Ok(outcome)
    }

    // ----------------------------------------------------------------------
    // Running balances

    /// Tell an account its running balances are stale from `from` onward.
    pub fn notify_dirty(&self, account_id: AccountId, from: Timestamp) -> Result<()> {
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.notify_dirty(from);
        Ok(())
    }

    fn balance_entry(&self, account_id: AccountId, entry: &AccountEntry) -> Option<BalanceEntry> {
        let transaction_id = match self.split_index.get(&entry.split_id) {
            Some(t) => *t,
            None => {
                debug!(split_id = %entry.split_id, "Skipping detached split");
                return None;
            }
        };
        let transaction = self.transactions.get(&transaction_id)?;
        let split = transaction
            .split(entry.split_id)
            .filter(|s| s.account() == account_id)?;

        Some(BalanceEntry {
            split_id: split.id(),
            transaction_id,
            date_posted: transaction.date_posted(),
            sequence: entry.sequence,
            amount: split.amount(),
            share_price: split.share_price(),
            reconciled: split.reconciled(),
        })
    }

    fn balance_entries(&self, account_id: AccountId) -> Result<(Vec<BalanceEntry>, Option<Timestamp>)> {
        let (entries, from) = {
            let mut account = self
                .accounts
                .get_mut(&account_id)
                .ok_or(LedgerError::AccountNotFound(account_id))?;
            (account.entries().to_vec(), account.take_dirty())
        };

        let inputs = entries
            .iter()
            .filter_map(|entry| self.balance_entry(account_id, entry))
            .collect();
        Ok((inputs, from))
    }

    /// Recompute the running balances of every split in an account.
    ///
    /// Splits are processed in non-decreasing posted date, ties broken by the
    /// order they were indexed into the account. Only splits dated at or after
    /// the pending dirty date are rewritten. Idempotent.
    #[instrument(skip(self))]
    pub fn recompute_balances(&self, account_id: AccountId) -> Result<RunningBalances> {
        let _gate = self.recompute_gate.lock();

        let (inputs, from) = self.balance_entries(account_id)?;
        let points = match compute_running_balances(inputs) {
            Ok(points) => points,
            Err(e) => {
                if let (Some(from), Some(mut account)) = (from, self.accounts.get_mut(&account_id)) {
                    account.notify_dirty(from);
                }
                return Err(e);
            }
        };
        let closing = points.last().map(|p| p.balances).unwrap_or_default();

        let mut written = 0usize;
        for point in &points {
            if from.is_some_and(|from| point.date_posted < from) {
                continue;
            }
            if let Some(mut transaction) = self.transactions.get_mut(&point.transaction_id) {
                if let Some(split) = transaction
                    .splits_mut()
                    .iter_mut()
                    .find(|s| s.id() == point.split_id)
                {
                    split.set_balances(point.balances);
                    written += 1;
                }
            }
        }

        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.set_closing_balances(closing);
        }

        debug!(
            account = %account_id,
            splits = points.len(),
            written,
            balance = %closing.balance,
            "Running balances recomputed"
        );
        Ok(closing)
    }

    /// Recompute every account with a pending dirty marker. Returns how many
    /// accounts were processed.
    pub fn recompute_dirty(&self) -> usize {
        let dirty: Vec<AccountId> = self
            .accounts
            .iter()
            .filter(|a| a.is_dirty())
            .map(|a| a.id)
            .collect();

        for account_id in &dirty {
            if let Err(e) = self.recompute_balances(*account_id) {
                warn!(account = %account_id, error = %e, "Recompute failed");
            }
        }
        dirty.len()
    }

    /// Closing balances of an account, recomputing first if stale.
    pub fn account_balances(&self, account_id: AccountId) -> Result<RunningBalances> {
        let dirty = self
            .accounts
            .get(&account_id)
            .map(|a| a.is_dirty())
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        if dirty {
            return self.recompute_balances(account_id);
        }

        Ok(self
            .accounts
            .get(&account_id)
            .map(|a| a.closing_balances())
            .unwrap_or_default())
    }

    /// Snapshots of an account's live splits in running-balance order.
    pub fn account_splits(&self, account_id: AccountId) -> Result<Vec<Split>> {
        let entries = self
            .accounts
            .get(&account_id)
            .map(|a| a.entries().to_vec())
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let mut inputs: Vec<BalanceEntry> = entries
            .iter()
            .filter_map(|entry| self.balance_entry(account_id, entry))
            .collect();
        crate::balance::sort_entries(&mut inputs);

        Ok(inputs
            .into_iter()
            .filter_map(|entry| {
                self.transactions
                    .get(&entry.transaction_id)
                    .and_then(|t| t.split(entry.split_id).cloned())
            })
            .collect())
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn book_with_accounts(n: usize) -> (Book, Vec<AccountId>) {
        let book = Book::default();
        let accounts = (0..n)
            .map(|i| book.create_account(format!("Account {}", i)))
            .collect();
        (book, accounts)
    }

    #[test]
    fn test_add_split_indexes_account() {
        let (book, accounts) = book_with_accounts(2);
        let txn = book.create_transaction();
        let split = book.add_split(txn, accounts[0], dec!(10)).unwrap();

        let account = book.account(accounts[0]).unwrap();
        assert!(account.contains(split));
        assert!(account.is_dirty());
        assert_eq!(book.split(split).unwrap().parent(), Some(txn));
    }

    #[test]
    fn test_add_split_unknown_account() {
        let book = Book::default();
        let txn = book.create_transaction();
        let err = book.add_split(txn, AccountId::new(), dec!(1)).unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_NOT_FOUND");
    }

    #[test]
    fn test_rebalance_dangling_split_fails() {
        let (book, accounts) = book_with_accounts(2);
        let txn = book.create_transaction();
        book.add_split(txn, accounts[0], dec!(10)).unwrap();
        let dest = book.add_split(txn, accounts[1], dec!(-10)).unwrap();

        let removed = book.remove_split(txn, dest).unwrap();
        let err = book.rebalance(removed.id()).unwrap_err();
        assert!(matches!(err, LedgerError::DanglingSplit(_)));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_remove_split_wrong_transaction() {
        let (book, accounts) = book_with_accounts(1);
        let a = book.create_transaction();
        let b = book.create_transaction();
        let split = book.add_split(a, accounts[0], dec!(1)).unwrap();

        let err = book.remove_split(b, split).unwrap_err();
        assert!(matches!(err, LedgerError::SplitNotInTransaction { .. }));
        assert!(book.split(split).is_some());
    }

    #[test]
    fn test_mirror_split_is_indexed() {
        let (book, accounts) = book_with_accounts(1);
        book.set_account_policy(accounts[0], Some(true)).unwrap();
        let txn = book.create_transaction();
        let source = book.add_split(txn, accounts[0], dec!(50)).unwrap();

        let outcome = book.rebalance(source).unwrap();
        let mirror = outcome.adjusted_split().unwrap();

        assert!(book.account(accounts[0]).unwrap().contains(mirror));
        assert_eq!(book.split(mirror).unwrap().amount(), dec!(-50));
        assert_eq!(book.imbalance(txn).unwrap(), dec!(0));
    }

    #[test]
    fn test_discard_refuses_live_split_copy() {
        let (book, accounts) = book_with_accounts(1);
        let txn = book.create_transaction();
        let split_id = book.add_split(txn, accounts[0], dec!(1)).unwrap();

        let copy = book.split(split_id).unwrap();
        assert!(book.discard_split(copy).is_err());
        assert!(book.account(accounts[0]).unwrap().contains(split_id));
    }

    #[test]
    fn test_discard_unindexes_account() {
        let (book, accounts) = book_with_accounts(1);
        let txn = book.create_transaction();
        let split_id = book.add_split(txn, accounts[0], dec!(1)).unwrap();

        let split = book.remove_split(txn, split_id).unwrap();
        assert!(book.account(accounts[0]).unwrap().contains(split_id));

        book.discard_split(split).unwrap();
        assert!(!book.account(accounts[0]).unwrap().contains(split_id));
    }

    #[test]
    fn test_reparent_moves_index() {
        let (book, accounts) = book_with_accounts(2);
        let txn = book.create_transaction();
        let split_id = book.add_split(txn, accounts[0], dec!(5)).unwrap();

        let previous = book.set_split_account(split_id, accounts[1]).unwrap();
        assert_eq!(previous, accounts[0]);
        assert!(!book.account(accounts[0]).unwrap().contains(split_id));
        assert!(book.account(accounts[1]).unwrap().contains(split_id));
        assert_eq!(book.split(split_id).unwrap().account(), accounts[1]);
    }

    #[test]
    fn test_load_transaction_clears_write_flag() {
        let (book, accounts) = book_with_accounts(2);
        let mut txn = Transaction::new();
        txn.append_split(Split::new(accounts[0]).with_amount(dec!(3)))
            .unwrap();
        txn.append_split(Split::new(accounts[1]).with_amount(dec!(-3)))
            .unwrap();
        let id = txn.id();

        book.load_transaction(txn.clone()).unwrap();
        let loaded = book.transaction(id).unwrap();
        assert!(!loaded.write_flag());
        assert_eq!(loaded.len(), 2);

        let err = book.load_transaction(txn).unwrap_err();
        assert_eq!(err, LedgerError::DuplicateTransaction(id));
    }

    #[test]
    fn test_set_date_posted_dirties_from_earlier_date() {
        let (book, accounts) = book_with_accounts(1);
        let txn = book.create_transaction();
        book.add_split(txn, accounts[0], dec!(5)).unwrap();
        book.recompute_dirty();

        let old = book.transaction(txn).unwrap().date_posted();
        let new = old - Duration::days(30);
        book.set_date_posted(txn, new).unwrap();

        assert_eq!(book.account(accounts[0]).unwrap().dirty_from(), Some(new));
    }

    #[test]
    fn test_commit_edit_flushes_dirty_accounts() {
        let (book, accounts) = book_with_accounts(2);
        let txn = book.create_transaction();
        let source = book.add_split(txn, accounts[0], dec!(40)).unwrap();
        book.add_split(txn, accounts[1], dec!(-40)).unwrap();
        book.rebalance(source).unwrap();

        book.commit_edit(txn).unwrap();

        assert!(!book.transaction(txn).unwrap().is_open());
        assert!(!book.account(accounts[0]).unwrap().is_dirty());
        assert_eq!(book.account_balances(accounts[1]).unwrap().balance, dec!(-40));
    }

    #[test]
    fn test_destroy_transaction_unindexes_splits() {
        let (book, accounts) = book_with_accounts(2);
        let txn = book.create_transaction();
        let a = book.add_split(txn, accounts[0], dec!(9)).unwrap();
        let b = book.add_split(txn, accounts[1], dec!(-9)).unwrap();

        book.destroy_transaction(txn).unwrap();

        assert!(book.transaction(txn).is_none());
        assert!(book.split(a).is_none());
        assert!(!book.account(accounts[0]).unwrap().contains(a));
        assert!(!book.account(accounts[1]).unwrap().contains(b));
        assert_eq!(book.account_balances(accounts[0]).unwrap().balance, dec!(0));
    }
}
