//! Monetary types for SplitBook.
//!
//! Amounts are exact decimals. Binary floating point never enters a sum, so a
//! rebalanced transaction totals exactly zero unless a division (share
//! quantity) produced a residual, which [`normalize`] folds back to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// A signed monetary value. Positive is a deposit, negative a payment.
pub type Amount = Decimal;

/// Default magnitude below which a computed amount is treated as zero.
pub const DEFAULT_BALANCE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 12);

/// Fold a value whose magnitude is below `epsilon` to exactly zero.
pub fn normalize(value: Decimal, epsilon: Decimal) -> Decimal {
    if is_negligible(value, epsilon) {
        Decimal::ZERO
    } else {
        value
    }
}

/// Check whether a value is zero within `epsilon`.
pub fn is_negligible(value: Decimal, epsilon: Decimal) -> bool {
    value.abs() < epsilon
}

/// Sum amounts exactly. Fails rather than wrapping when the total leaves
/// the decimal range.
pub fn sum_amounts<I>(amounts: I) -> Result<Amount>
where
    I: IntoIterator<Item = Amount>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, checked_add)
}

/// Add two amounts, reporting overflow as an error.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::AmountOverflow(format!("{} + {}", a, b)))
}

/// Price of one share in the account's currency.
///
/// Plain currency accounts use a price of one. The price is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SharePrice(Decimal);

impl SharePrice {
    /// Price for plain currency accounts.
    pub const ONE: SharePrice = SharePrice(Decimal::ONE);

    /// Create a share price, rejecting zero.
    pub fn new(price: Decimal) -> Result<Self> {
        if price.is_zero() {
            return Err(LedgerError::InvalidSharePrice(price));
        }
        Ok(Self(price))
    }

    /// Get the price value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Number of shares represented by `amount` at this price.
    ///
    /// Returns `None` if the division overflows the decimal range.
    pub fn quantity_of(&self, amount: Amount) -> Option<Decimal> {
        amount.checked_div(self.0)
    }
}

impl Default for SharePrice {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<Decimal> for SharePrice {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SharePrice> for Decimal {
    fn from(price: SharePrice) -> Self {
        price.0
    }
}

impl fmt::Display for SharePrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
