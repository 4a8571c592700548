use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::AccountNumber;

/// Category of a ledger posting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
    Interest,
    Refund,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Fee => "fee",
            TransactionType::Interest => "interest",
            TransactionType::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            "fee" => Ok(TransactionType::Fee),
            "interest" => Ok(TransactionType::Interest),
            "refund" => Ok(TransactionType::Refund),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Posting lifecycle. `Reversed` and `Cancelled` exist in the data model but
/// no ledger operation currently produces them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "reversed" => Ok(TransactionStatus::Reversed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Immutable record of one balance-affecting posting.
///
/// `amount` is always positive; the sign of the balance change is carried by
/// `balance_before`/`balance_after`. A transfer produces exactly two rows
/// (debit leg + credit leg) sharing one `reference` and pointing at each
/// other through `related_transaction`/`related_account`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Monotonic sequence id assigned by the store on insert.
    pub id: i64,
    /// Unique token for idempotent client-side lookups; shared by the two
    /// legs of a transfer.
    pub reference: String,
    pub account: AccountNumber,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub related_account: Option<AccountNumber>,
    pub related_transaction: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a completed posting; the store assigns `id` on insert.
    pub fn completed(
        account: AccountNumber,
        tx_type: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            reference: reference.into(),
            account,
            tx_type,
            amount,
            balance_before,
            balance_after,
            description: description.into(),
            status: TransactionStatus::Completed,
            related_account: None,
            related_transaction: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the counterparty account of a transfer leg.
    pub fn with_related_account(mut self, account: AccountNumber) -> Self {
        self.related_account = Some(account);
        self
    }

    /// Whether this posting debited its account.
    pub fn is_debit(&self) -> bool {
        self.balance_after < self.balance_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn debit_detection_follows_balance_delta() {
        let credit = Transaction::completed(
            AccountNumber::from("ACC1"),
            TransactionType::Transfer,
            dec!(50),
            dec!(100),
            dec!(150),
            "ref",
            "incoming",
        );
        assert!(!credit.is_debit());

        let debit = Transaction::completed(
            AccountNumber::from("ACC2"),
            TransactionType::Transfer,
            dec!(50),
            dec!(100),
            dec!(50),
            "ref",
            "outgoing",
        );
        assert!(debit.is_debit());
    }

    #[test]
    fn type_roundtrip() {
        for kind in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::Transfer,
            TransactionType::Fee,
            TransactionType::Interest,
            TransactionType::Refund,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionType>().unwrap(), kind);
        }
    }
}
