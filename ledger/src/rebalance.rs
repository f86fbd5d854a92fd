//! Rebalancing: restore the zero-sum of a transaction after one split changed.
//!
//! If the edited split is a destination (not the first split), the source
//! split's amount becomes minus the total of all destinations; the source's
//! share price is left alone. If the edited split is the source, the first
//! destination absorbs the difference. A source with no destination is either
//! left as single-entry or mirrored into a new split against the same account,
//! depending on `forced_double_entry`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use splitbook_common::{
    checked_add, normalize, sum_amounts, AccountId, Amount, LedgerError, Result, SplitId,
    DEFAULT_BALANCE_EPSILON,
};

use crate::split::Split;
use crate::transaction::Transaction;

/// Policy inputs for one rebalance call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalancePolicy {
    /// Mirror a lone source split into a new destination split.
    pub forced_double_entry: bool,
    /// Amounts with a smaller magnitude are treated as zero.
    pub epsilon: Decimal,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            forced_double_entry: false,
            epsilon: DEFAULT_BALANCE_EPSILON,
        }
    }
}

impl RebalancePolicy {
    pub fn forced() -> Self {
        Self {
            forced_double_entry: true,
            ..Self::default()
        }
    }
}

/// Role of a split within its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitRole {
    /// First split of the transaction.
    Source,
    /// Any other split.
    Destination,
}

impl SplitRole {
    pub fn of_index(index: usize) -> Self {
        if index == 0 {
            SplitRole::Source
        } else {
            SplitRole::Destination
        }
    }
}

/// What a rebalance changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceOutcome {
    /// The transaction has no splits; nothing to balance.
    Empty,
    /// A destination was edited; the source absorbed the difference.
    SourceAdjusted { split_id: SplitId, amount: Amount },
    /// The source was edited; the first destination absorbed the difference.
    DestinationAdjusted { split_id: SplitId, amount: Amount },
    /// The source had no destination; a mirror split was appended.
    MirrorCreated {
        split_id: SplitId,
        account: AccountId,
        amount: Amount,
    },
    /// The source had no destination and the policy permits single-entry.
    SingleEntry { imbalance: Amount },
}

impl RebalanceOutcome {
    /// The split whose amount was written, if any.
    pub fn adjusted_split(&self) -> Option<SplitId> {
        match self {
            RebalanceOutcome::SourceAdjusted { split_id, .. }
            | RebalanceOutcome::DestinationAdjusted { split_id, .. }
            | RebalanceOutcome::MirrorCreated { split_id, .. } => Some(*split_id),
            RebalanceOutcome::Empty | RebalanceOutcome::SingleEntry { .. } => None,
        }
    }

    pub fn is_single_entry(&self) -> bool {
        matches!(self, RebalanceOutcome::SingleEntry { .. })
    }
}

/// Force the total of `transaction` back to zero after `edited` changed.
///
/// Fails only on a broken contract: `edited` is not one of the transaction's
/// splits, or the source split does not name this transaction as its parent.
pub fn rebalance(
    transaction: &mut Transaction,
    edited: SplitId,
    policy: &RebalancePolicy,
) -> Result<RebalanceOutcome> {
    if transaction.is_empty() {
        debug!(transaction_id = %transaction.id(), "Nothing to rebalance");
        return Ok(RebalanceOutcome::Empty);
    }

    let index = transaction
        .position(edited)
        .ok_or(LedgerError::SplitNotInTransaction {
            split_id: edited,
            transaction_id: transaction.id(),
        })?;

    check_source(transaction)?;

    let adjusted = match (SplitRole::of_index(index), transaction.splits_mut()) {
        (SplitRole::Destination, [source, destinations @ ..]) => {
            Some(adjust_source(source, destinations, policy.epsilon)?)
        }
        (SplitRole::Source, [source, first, others @ ..]) => {
            Some(adjust_first_destination(source, first, others, policy.epsilon)?)
        }
        _ => None,
    };

    let outcome = match adjusted {
        Some(outcome) => outcome,
        None if policy.forced_double_entry => mirror_source(transaction)?,
        None => {
            let imbalance = transaction.imbalance(policy.epsilon)?;
            if !imbalance.is_zero() {
                warn!(
                    transaction_id = %transaction.id(),
                    imbalance = %imbalance,
                    "Transaction left single-entry"
                );
            }
            RebalanceOutcome::SingleEntry { imbalance }
        }
    };

    debug!(
        transaction_id = %transaction.id(),
        split_id = %edited,
        outcome = ?outcome,
        "Rebalanced"
    );

    Ok(outcome)
}

fn check_source(transaction: &Transaction) -> Result<()> {
    match transaction.source() {
        Some(source) if source.parent() == Some(transaction.id()) => Ok(()),
        Some(source) => Err(LedgerError::DanglingSplit(source.id())),
        None => Ok(()),
    }
}

fn adjust_source(
    source: &mut Split,
    destinations: &[Split],
    epsilon: Decimal,
) -> Result<RebalanceOutcome> {
    let destination_total = sum_amounts(destinations.iter().map(|s| s.amount()))?;
    let amount = normalize(-destination_total, epsilon);
    source.set_amount(amount);

    Ok(RebalanceOutcome::SourceAdjusted {
        split_id: source.id(),
        amount,
    })
}

fn adjust_first_destination(
    source: &Split,
    first: &mut Split,
    others: &[Split],
    epsilon: Decimal,
) -> Result<RebalanceOutcome> {
    let others_total = sum_amounts(others.iter().map(|s| s.amount()))?;
    let amount = normalize(-checked_add(source.amount(), others_total)?, epsilon);
    first.set_amount(amount);

    Ok(RebalanceOutcome::DestinationAdjusted {
        split_id: first.id(),
        amount,
    })
}

fn mirror_source(transaction: &mut Transaction) -> Result<RebalanceOutcome> {
    let source = &transaction.splits()[0];
    let account = source.account();
    let amount = -source.amount();

    let mirror = Split::new(account)
        .with_amount(amount)
        .with_share_price(source.share_price());
    let split_id = transaction.append_split(mirror)?;

    warn!(
        transaction_id = %transaction.id(),
        split_id = %split_id,
        account = %account,
        "Mirror split created against the source account; reparent it to the real destination"
    );

    Ok(RebalanceOutcome::MirrorCreated {
        split_id,
        account,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use splitbook_common::SharePrice;

    fn transaction(amounts: &[Decimal]) -> (Transaction, Vec<SplitId>) {
        let mut txn = Transaction::new();
        let ids = amounts
            .iter()
            .map(|a| {
                txn.append_split(Split::new(AccountId::new()).with_amount(*a))
                    .unwrap()
            })
            .collect();
        (txn, ids)
    }

    fn amounts(txn: &Transaction) -> Vec<Decimal> {
        txn.splits().iter().map(|s| s.amount()).collect()
    }

    #[test]
    fn test_destination_edit_adjusts_only_source() {
        let (mut txn, ids) = transaction(&[dec!(100), dec!(-60), dec!(-40)]);
        txn.split_mut(ids[2]).unwrap().set_amount(dec!(-55));

        let outcome = rebalance(&mut txn, ids[2], &RebalancePolicy::default()).unwrap();

        assert_eq!(
            outcome,
            RebalanceOutcome::SourceAdjusted {
                split_id: ids[0],
                amount: dec!(115)
            }
        );
        assert_eq!(amounts(&txn), vec![dec!(115), dec!(-60), dec!(-55)]);
        assert!(txn.total().unwrap().is_zero());
    }

    #[test]
    fn test_destination_edit_keeps_source_share_price() {
        let (mut txn, ids) = transaction(&[dec!(100), dec!(-100)]);
        let price = SharePrice::new(dec!(4)).unwrap();
        txn.split_mut(ids[0]).unwrap().set_share_price(price);
        txn.split_mut(ids[1]).unwrap().set_amount(dec!(-200));

        rebalance(&mut txn, ids[1], &RebalancePolicy::default()).unwrap();

        let source = txn.split(ids[0]).unwrap();
        assert_eq!(source.amount(), dec!(200));
        assert_eq!(source.share_price(), price);
        assert_eq!(source.share_quantity(), Some(dec!(50)));
    }

    #[test]
    fn test_source_edit_redistributes_to_first_destination() {
        let (mut txn, ids) = transaction(&[dec!(100), dec!(-60), dec!(-40)]);
        txn.split_mut(ids[0]).unwrap().set_amount(dec!(150));

        rebalance(&mut txn, ids[0], &RebalancePolicy::default()).unwrap();

        assert_eq!(amounts(&txn), vec![dec!(150), dec!(-110), dec!(-40)]);
    }

    #[test]
    fn test_forced_double_entry_mirrors_source() {
        let (mut txn, ids) = transaction(&[dec!(50)]);
        let account = txn.split(ids[0]).unwrap().account();

        let outcome = rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();

        assert!(matches!(outcome, RebalanceOutcome::MirrorCreated { .. }));
        assert_eq!(txn.len(), 2);
        let mirror = &txn.splits()[1];
        assert_eq!(mirror.amount(), dec!(-50));
        assert_eq!(mirror.account(), account);
        assert_eq!(mirror.share_price(), txn.splits()[0].share_price());
        assert!(txn.total().unwrap().is_zero());
    }

    #[test]
    fn test_single_entry_left_alone_when_not_forced() {
        let (mut txn, ids) = transaction(&[dec!(50)]);

        let outcome = rebalance(&mut txn, ids[0], &RebalancePolicy::default()).unwrap();

        assert_eq!(outcome, RebalanceOutcome::SingleEntry { imbalance: dec!(50) });
        assert_eq!(txn.len(), 1);
        assert_eq!(txn.total().unwrap(), dec!(50));
    }

    #[test]
    fn test_empty_transaction_is_not_rebalanced() {
        let (mut txn, ids) = transaction(&[dec!(10)]);
        txn.remove_split(ids[0]).unwrap();

        let outcome = rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();
        assert_eq!(outcome, RebalanceOutcome::Empty);
        assert!(txn.is_empty());
    }

    #[test]
    fn test_removed_split_is_contract_violation() {
        let (mut txn, ids) = transaction(&[dec!(100), dec!(-60), dec!(-40)]);
        txn.remove_split(ids[1]).unwrap();

        let err = rebalance(&mut txn, ids[1], &RebalancePolicy::default()).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_removal_then_source_rebalance_uses_remaining_destination() {
        let (mut txn, ids) = transaction(&[dec!(100), dec!(-60), dec!(-40)]);
        txn.remove_split(ids[1]).unwrap();
        assert_eq!(amounts(&txn), vec![dec!(100), dec!(-40)]);

        rebalance(&mut txn, ids[0], &RebalancePolicy::default()).unwrap();
        assert_eq!(amounts(&txn), vec![dec!(100), dec!(-100)]);
    }

    #[test]
    fn test_rebalance_is_idempotent() {
        let (mut txn, ids) = transaction(&[dec!(10), dec!(-3), dec!(-3)]);
        txn.split_mut(ids[0]).unwrap().set_amount(dec!(12.34));

        rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();
        let first = amounts(&txn);
        rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();
        assert_eq!(amounts(&txn), first);
        assert_eq!(txn.len(), 3);
    }

    #[test]
    fn test_mirror_then_rebalance_does_not_duplicate() {
        let (mut txn, ids) = transaction(&[dec!(7)]);
        rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();
        rebalance(&mut txn, ids[0], &RebalancePolicy::forced()).unwrap();
        assert_eq!(txn.len(), 2);
    }

    #[test]
    fn test_residual_below_epsilon_is_zero() {
        let (mut txn, ids) = transaction(&[dec!(1), dec!(-1)]);
        txn.split_mut(ids[1])
            .unwrap()
            .set_amount(dec!(-0.0000000000000001));

        rebalance(&mut txn, ids[1], &RebalancePolicy::default()).unwrap();
        assert_eq!(txn.splits()[0].amount(), Decimal::ZERO);
    }

    #[test]
    fn test_overflowing_sums_are_errors_and_leave_amounts_alone() {
        let policy = RebalancePolicy::default();

        let (mut txn, ids) = transaction(&[Decimal::ONE, Decimal::MAX, Decimal::MAX]);
        let err = rebalance(&mut txn, ids[0], &policy).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");
        assert!(!err.is_contract_violation());

        let err = rebalance(&mut txn, ids[2], &policy).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");
        assert_eq!(amounts(&txn), vec![Decimal::ONE, Decimal::MAX, Decimal::MAX]);
        assert!(!txn.is_balanced(policy.epsilon));
    }

    fn amount_strategy() -> impl Strategy<Value = Decimal> {
        (-1_000_000_00i64..1_000_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #[test]
        fn prop_edits_followed_by_rebalance_sum_to_zero(
            initial in prop::collection::vec(amount_strategy(), 1..6),
            edits in prop::collection::vec((0usize..6, amount_strategy()), 1..20),
            forced in any::<bool>(),
        ) {
            let (mut txn, _) = transaction(&initial);
            let policy = RebalancePolicy { forced_double_entry: forced, ..RebalancePolicy::default() };

            for (index, amount) in edits {
                let index = index % txn.len();
                let split_id = txn.splits()[index].id();
                txn.split_mut(split_id).unwrap().set_amount(amount);

                let outcome = rebalance(&mut txn, split_id, &policy).unwrap();
                if !outcome.is_single_entry() {
                    prop_assert!(txn.total().unwrap().is_zero());
                }
            }
        }

        #[test]
        fn prop_destination_edit_touches_only_source(
            initial in prop::collection::vec(amount_strategy(), 2..6),
            pick in 1usize..6,
            amount in amount_strategy(),
        ) {
            let (mut txn, _) = transaction(&initial);
            let index = 1 + pick % (txn.len() - 1);
            let split_id = txn.splits()[index].id();
            txn.split_mut(split_id).unwrap().set_amount(amount);
            let before = amounts(&txn);

            rebalance(&mut txn, split_id, &RebalancePolicy::default()).unwrap();
            let after = amounts(&txn);

            prop_assert_eq!(&before[1..], &after[1..]);
            prop_assert!(txn.splits().iter().all(|s| s.share_price() == SharePrice::ONE));
            prop_assert!(txn.total().unwrap().is_zero());
        }
    }
}
