//! Running balance computation.
//!
//! Each split carries the cumulative value, cleared and reconciled balances of
//! its account, plus the same three in share quantity, taken over the
//! account's splits ordered by posted date up to and including the split.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use splitbook_common::{
    checked_add, Amount, Result, SharePrice, SplitId, Timestamp, TransactionId,
};

use crate::split::ReconcileState;

/// The six running balance fields of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunningBalances {
    pub balance: Decimal,
    pub cleared_balance: Decimal,
    pub reconciled_balance: Decimal,
    pub share_balance: Decimal,
    pub share_cleared_balance: Decimal,
    pub share_reconciled_balance: Decimal,
}

impl RunningBalances {
    /// Add one split's contribution. On overflow `self` is left unchanged.
    pub fn accumulate(
        &mut self,
        amount: Amount,
        quantity: Decimal,
        state: ReconcileState,
    ) -> Result<()> {
        let mut next = *self;
        next.balance = checked_add(next.balance, amount)?;
        next.share_balance = checked_add(next.share_balance, quantity)?;

        if state.is_cleared() {
            next.cleared_balance = checked_add(next.cleared_balance, amount)?;
            next.share_cleared_balance = checked_add(next.share_cleared_balance, quantity)?;
        }

        if state.is_reconciled() {
            next.reconciled_balance = checked_add(next.reconciled_balance, amount)?;
            next.share_reconciled_balance =
                checked_add(next.share_reconciled_balance, quantity)?;
        }

        *self = next;
        Ok(())
    }
}

/// The inputs needed to place one split in an account's running balance.
#[derive(Debug, Clone)]
pub struct BalanceEntry {
    pub split_id: SplitId,
    pub transaction_id: TransactionId,
    pub date_posted: Timestamp,
    /// Order in which the split was indexed into the account; breaks ties
    /// between equal posted dates.
    pub sequence: u64,
    pub amount: Amount,
    pub share_price: SharePrice,
    pub reconciled: ReconcileState,
}

/// A computed running balance for one split.
#[derive(Debug, Clone)]
pub struct BalancePoint {
    pub split_id: SplitId,
    pub transaction_id: TransactionId,
    pub date_posted: Timestamp,
    pub balances: RunningBalances,
}

/// Order entries by (posted date, account sequence).
pub fn sort_entries(entries: &mut [BalanceEntry]) {
    entries.sort_by(|a, b| {
        a.date_posted
            .cmp(&b.date_posted)
            .then(a.sequence.cmp(&b.sequence))
    });
}

/// Compute cumulative balances over `entries` in date order.
///
/// Pure function of its input: running it twice on the same entries yields
/// identical points.
pub fn compute_running_balances(mut entries: Vec<BalanceEntry>) -> Result<Vec<BalancePoint>> {
    sort_entries(&mut entries);

    let mut running = RunningBalances::default();
    let mut points = Vec::with_capacity(entries.len());

    for entry in entries {
        let quantity = match entry.share_price.quantity_of(entry.amount) {
            Some(q) => q,
            None => {
                warn!(
                    split_id = %entry.split_id,
                    amount = %entry.amount,
                    share_price = %entry.share_price,
                    "Share quantity overflow, counted as zero"
                );
                Decimal::ZERO
            }
        };

        running.accumulate(entry.amount, quantity, entry.reconciled)?;

        points.push(BalancePoint {
            split_id: entry.split_id,
            transaction_id: entry.transaction_id,
            date_posted: entry.date_posted,
            balances: running,
        });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use splitbook_common::now;

    fn entry(date: Timestamp, sequence: u64, amount: Decimal) -> BalanceEntry {
        BalanceEntry {
            split_id: SplitId::new(),
            transaction_id: TransactionId::new(),
            date_posted: date,
            sequence,
            amount,
            share_price: SharePrice::ONE,
            reconciled: ReconcileState::NotReconciled,
        }
    }

    #[test]
    fn test_balances_follow_date_not_insertion() {
        let d1 = now();
        let d2 = d1 + Duration::days(1);
        let d3 = d1 + Duration::days(2);

        // Inserted out of date order.
        let entries = vec![
            entry(d3, 0, dec!(5)),
            entry(d1, 1, dec!(100)),
            entry(d2, 2, dec!(-30)),
        ];

        let points = compute_running_balances(entries).unwrap();
        let balances: Vec<_> = points.iter().map(|p| p.balances.balance).collect();
        assert_eq!(balances, vec![dec!(100), dec!(70), dec!(75)]);
        assert_eq!(points[0].date_posted, d1);
        assert_eq!(points[2].date_posted, d3);
    }

    #[test]
    fn test_equal_dates_use_sequence() {
        let d = now();
        let first = entry(d, 7, dec!(10));
        let second = entry(d, 3, dec!(20));
        let second_id = second.split_id;

        let points = compute_running_balances(vec![first, second]).unwrap();
        assert_eq!(points[0].split_id, second_id);
        assert_eq!(points[0].balances.balance, dec!(20));
        assert_eq!(points[1].balances.balance, dec!(30));
    }

    #[test]
    fn test_cleared_and_reconciled_balances() {
        let d = now();
        let mut cleared = entry(d, 0, dec!(10));
        cleared.reconciled = ReconcileState::Cleared;
        let mut reconciled = entry(d, 1, dec!(20));
        reconciled.reconciled = ReconcileState::Reconciled;
        let open = entry(d, 2, dec!(40));

        let points = compute_running_balances(vec![cleared, reconciled, open]).unwrap();
        let last = points.last().unwrap().balances;
        assert_eq!(last.balance, dec!(70));
        assert_eq!(last.cleared_balance, dec!(30));
        assert_eq!(last.reconciled_balance, dec!(20));
    }

    #[test]
    fn test_share_balances_divide_by_price() {
        let d = now();
        let mut buy = entry(d, 0, dec!(1000));
        buy.share_price = SharePrice::new(dec!(50)).unwrap();
        let mut sell = entry(d + Duration::days(1), 1, dec!(-250));
        sell.share_price = SharePrice::new(dec!(25)).unwrap();

        let points = compute_running_balances(vec![buy, sell]).unwrap();
        assert_eq!(points[0].balances.share_balance, dec!(20));
        assert_eq!(points[1].balances.share_balance, dec!(10));
        assert_eq!(points[1].balances.balance, dec!(750));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let d = now();
        let entries = vec![entry(d, 0, dec!(1.25)), entry(d, 1, dec!(-0.25))];

        let first: Vec<_> = compute_running_balances(entries.clone())
            .unwrap()
            .into_iter()
            .map(|p| p.balances)
            .collect();
        let second: Vec<_> = compute_running_balances(entries)
            .unwrap()
            .into_iter()
            .map(|p| p.balances)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_balance_overflow_is_an_error() {
        let d = now();
        let err = compute_running_balances(vec![entry(d, 0, Decimal::MAX), entry(d, 1, Decimal::MAX)])
            .unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");

        let mut running = RunningBalances::default();
        running
            .accumulate(Decimal::MAX, Decimal::ZERO, ReconcileState::Cleared)
            .unwrap();
        assert!(running
            .accumulate(Decimal::ONE, Decimal::ZERO, ReconcileState::Cleared)
            .is_err());
        assert_eq!(running.balance, Decimal::MAX);
        assert_eq!(running.cleared_balance, Decimal::MAX);
    }
}
