//! Transactional ledger engine for the Tally banking stack.
//!
//! Each operation (deposit, withdraw, transfer, open, close) is an atomic
//! unit serialized per account: it holds the accounts' locks, validates
//! every invariant against freshly-read state, and commits the balance
//! mutation together with its transaction log row, limit reservation, and
//! audit record. Alerts are emitted only after the unit commits.

mod alerts;
mod audit;
mod limits;
mod locks;
mod ops;

pub use alerts::{Alert, AlertBus, AlertKind, AlertSeverity, AlertStream};
pub use locks::{AccountGuards, LockTable};
pub use ops::{Ledger, LedgerConfig, PostingReceipt, TransferReceipt};
