use rust_decimal::Decimal;
use thiserror::Error;

use crate::limit::LimitType;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error taxonomy surfaced by ledger operations.
///
/// Business-rule failures (`AccountNotFound` through `NonZeroBalance`) are
/// final: the operation aborted before any write was committed. `Conflict`
/// and `Storage` are retryable infrastructure failures; the atomic unit was
/// rolled back in full.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found or not active: {0}")]
    AccountNotFound(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{limit_type} limit exceeded for {account}: {used} used of {cap}, requested {requested}")]
    LimitExceeded {
        account: String,
        limit_type: LimitType,
        cap: Decimal,
        used: Decimal,
        requested: Decimal,
    },

    #[error("transfer source and destination accounts are the same")]
    SelfTransfer,

    #[error("account {account} holds a non-zero balance of {balance}")]
    NonZeroBalance { account: String, balance: Decimal },

    #[error("could not acquire account lock(s) within the deadline: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// Whether the caller may usefully retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Storage(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
