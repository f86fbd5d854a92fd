//! SplitBook Ledger Core
//!
//! Split-based double-entry bookkeeping: transactions own ordered splits, a
//! rebalancer keeps every transaction summing to zero, and accounts maintain
//! date-ordered running balances over the splits indexed into them.

pub mod split;
pub mod transaction;
pub mod rebalance;
pub mod account;
pub mod balance;
pub mod config;
pub mod book;

pub use book::Book;
pub use split::{ReconcileState, Split};
pub use transaction::Transaction;
pub use rebalance::{rebalance, RebalanceOutcome, RebalancePolicy, SplitRole};
pub use account::{Account, AccountEntry};
pub use balance::{BalancePoint, RunningBalances};
pub use config::LedgerConfig;
