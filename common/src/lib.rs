//! SplitBook Common Types
//!
//! This crate contains the value types shared across SplitBook: exact-decimal
//! amounts, share prices, timestamps, entity identifiers and the ledger error
//! taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
