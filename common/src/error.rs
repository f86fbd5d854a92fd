//! Error types for SplitBook.

use crate::{AccountId, SplitId, TransactionId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for ledger operations.
///
/// Almost every variant is a contract violation: the caller handed the core a
/// reference that is dangling, double-owned or missing. These are programming
/// errors and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Split is not owned by any transaction (removed, discarded or never attached).
    #[error("Split {0} is not attached to any transaction")]
    DanglingSplit(SplitId),

    /// Split is owned by a different transaction than the one named.
    #[error("Split {split_id} is not owned by transaction {transaction_id}")]
    SplitNotInTransaction {
        split_id: SplitId,
        transaction_id: TransactionId,
    },

    /// Split already has a parent and cannot be attached again.
    #[error("Split {split_id} is already owned by transaction {parent}")]
    SplitAlreadyAttached {
        split_id: SplitId,
        parent: TransactionId,
    },

    /// A transaction with this id already exists in the book.
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(TransactionId),

    /// A split with this id already exists in the book.
    #[error("Duplicate split: {0}")]
    DuplicateSplit(SplitId),

    /// A sum of amounts left the representable decimal range.
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Share price of zero.
    #[error("Invalid share price: {0}")]
    InvalidSharePrice(Decimal),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Check if this error signals a broken caller contract rather than bad input.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::TransactionNotFound(_)
                | LedgerError::AccountNotFound(_)
                | LedgerError::DanglingSplit(_)
                | LedgerError::SplitNotInTransaction { .. }
                | LedgerError::SplitAlreadyAttached { .. }
                | LedgerError::DuplicateTransaction(_)
                | LedgerError::DuplicateSplit(_)
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::DanglingSplit(_) => "DANGLING_SPLIT",
            LedgerError::SplitNotInTransaction { .. } => "SPLIT_NOT_IN_TRANSACTION",
            LedgerError::SplitAlreadyAttached { .. } => "SPLIT_ALREADY_ATTACHED",
            LedgerError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            LedgerError::DuplicateSplit(_) => "DUPLICATE_SPLIT",
            LedgerError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            LedgerError::InvalidSharePrice(_) => "INVALID_SHARE_PRICE",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
