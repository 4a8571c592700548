//! Durable SQLite storage for the Tally ledger engine.

mod query;
mod sqlite;

pub use query::TransactionQuery;
pub use sqlite::{SqliteStore, StoreTx};
