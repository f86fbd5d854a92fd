//! Split: one ledger entry of a transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitbook_common::{AccountId, Amount, SharePrice, SplitId, Timestamp, TransactionId};

use crate::balance::RunningBalances;

/// Reconciliation state of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    /// Not yet seen on a statement.
    #[default]
    NotReconciled,
    /// Cleared by the bank but not yet reconciled.
    Cleared,
    /// Reconciled against a statement.
    Reconciled,
}

impl ReconcileState {
    /// One-character code (`n`, `c`, `y`).
    pub fn as_char(&self) -> char {
        match self {
            ReconcileState::NotReconciled => 'n',
            ReconcileState::Cleared => 'c',
            ReconcileState::Reconciled => 'y',
        }
    }

    /// Parse a one-character code.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'n' | 'N' => Some(ReconcileState::NotReconciled),
            'c' | 'C' => Some(ReconcileState::Cleared),
            'y' | 'Y' => Some(ReconcileState::Reconciled),
            _ => None,
        }
    }

    /// Counts toward the cleared balance (cleared or reconciled).
    pub fn is_cleared(&self) -> bool {
        !matches!(self, ReconcileState::NotReconciled)
    }

    /// Counts toward the reconciled balance.
    pub fn is_reconciled(&self) -> bool {
        matches!(self, ReconcileState::Reconciled)
    }
}

/// One entry of a transaction, affecting exactly one account.
///
/// The split is owned by its transaction. `account` and `parent` are plain id
/// handles: the account indexes the split but never owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    id: SplitId,
    account: AccountId,
    parent: Option<TransactionId>,
    memo: String,
    action: String,
    reconciled: ReconcileState,
    amount: Amount,
    share_price: SharePrice,
    date_reconciled: Option<Timestamp>,
    balances: RunningBalances,
}

impl Split {
    /// Create an empty, detached split against `account`.
    pub fn new(account: AccountId) -> Self {
        Self {
            id: SplitId::new(),
            account,
            parent: None,
            memo: String::new(),
            action: String::new(),
            reconciled: ReconcileState::NotReconciled,
            amount: Decimal::ZERO,
            share_price: SharePrice::ONE,
            date_reconciled: None,
            balances: RunningBalances::default(),
        }
    }

    /// Set the amount (builder style).
    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    /// Set the share price (builder style).
    pub fn with_share_price(mut self, share_price: SharePrice) -> Self {
        self.share_price = share_price;
        self
    }

    /// Set the memo (builder style).
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn id(&self) -> SplitId {
        self.id
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Owning transaction, `None` when detached.
    pub fn parent(&self) -> Option<TransactionId> {
        self.parent
    }

    pub fn is_detached(&self) -> bool {
        self.parent.is_none()
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn reconciled(&self) -> ReconcileState {
        self.reconciled
    }

    /// Date of reconciliation; only present while the state is not `NotReconciled`.
    pub fn date_reconciled(&self) -> Option<Timestamp> {
        self.date_reconciled
    }

    /// Signed amount. This is the split's value for balancing.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn share_price(&self) -> SharePrice {
        self.share_price
    }

    /// Share quantity (`amount / share_price`).
    pub fn share_quantity(&self) -> Option<Decimal> {
        self.share_price.quantity_of(self.amount)
    }

    /// Cached running balances as of this split in its account's date order.
    pub fn balances(&self) -> &RunningBalances {
        &self.balances
    }

    pub fn set_amount(&mut self, amount: Amount) {
        self.amount = amount;
    }

    pub fn set_share_price(&mut self, share_price: SharePrice) {
        self.share_price = share_price;
    }

    /// Reparent to another account. Returns the previous account.
    ///
    /// Crate-private: the owning account's index must move with the split,
    /// which only the book can do.
    pub(crate) fn set_account(&mut self, account: AccountId) -> AccountId {
        std::mem::replace(&mut self.account, account)
    }

    pub fn set_memo(&mut self, memo: impl Into<String>) {
        self.memo = memo.into();
    }

    pub fn set_action(&mut self, action: impl Into<String>) {
        self.action = action.into();
    }

    /// Change the reconciliation state. The date is dropped when the state
    /// returns to `NotReconciled`.
    pub fn set_reconciled(&mut self, state: ReconcileState, at: Timestamp) {
        self.reconciled = state;
        self.date_reconciled = match state {
            ReconcileState::NotReconciled => None,
            _ => Some(at),
        };
    }

    pub(crate) fn set_parent(&mut self, parent: Option<TransactionId>) {
        self.parent = parent;
    }

    pub(crate) fn set_balances(&mut self, balances: RunningBalances) {
        self.balances = balances;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use splitbook_common::now;

    #[test]
    fn test_new_split_is_empty_and_detached() {
        let account = AccountId::new();
        let split = Split::new(account);

        assert!(split.is_detached());
        assert_eq!(split.account(), account);
        assert_eq!(split.amount(), Decimal::ZERO);
        assert_eq!(split.share_price(), SharePrice::ONE);
        assert_eq!(split.reconciled(), ReconcileState::NotReconciled);
        assert_eq!(*split.balances(), RunningBalances::default());
    }

    #[test]
    fn test_share_quantity_uses_price() {
        let split = Split::new(AccountId::new())
            .with_amount(dec!(-300))
            .with_share_price(SharePrice::new(dec!(15)).unwrap());
        assert_eq!(split.share_quantity(), Some(dec!(-20)));
    }

    #[test]
    fn test_reconcile_date_follows_state() {
        let mut split = Split::new(AccountId::new());
        let at = now();

        split.set_reconciled(ReconcileState::Cleared, at);
        assert_eq!(split.date_reconciled(), Some(at));

        split.set_reconciled(ReconcileState::NotReconciled, at);
        assert_eq!(split.date_reconciled(), None);
    }

    #[test]
    fn test_reconcile_state_codes() {
        for state in [
            ReconcileState::NotReconciled,
            ReconcileState::Cleared,
            ReconcileState::Reconciled,
        ] {
            assert_eq!(ReconcileState::from_char(state.as_char()), Some(state));
        }
        assert_eq!(ReconcileState::from_char('x'), None);
        assert!(ReconcileState::Reconciled.is_cleared());
        assert!(!ReconcileState::Cleared.is_reconciled());
    }

    #[test]
    fn test_set_account_returns_previous() {
        let old = AccountId::new();
        let new = AccountId::new();
        let mut split = Split::new(old);
        assert_eq!(split.set_account(new), old);
        assert_eq!(split.account(), new);
    }
}
