//! Core domain types shared across the Tally ledger engine.

mod account;
mod amount;
mod audit;
mod error;
mod ident;
mod limit;
mod transaction;

pub use account::{Account, AccountNumber, AccountStatus, AccountType, UserId};
pub use amount::{validate_amount, AMOUNT_SCALE};
pub use audit::AuditEntry;
pub use error::{LedgerError, LedgerResult};
pub use ident::{account_number, reference_token};
pub use limit::{LimitEntry, LimitPeriod, LimitType};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
