use chrono::{DateTime, Utc};
use tally_core::{AccountNumber, TransactionType};

/// Filter describing which transactions to load from storage.
#[derive(Clone, Debug, Default)]
pub struct TransactionQuery {
    pub account: Option<AccountNumber>,
    pub tx_type: Option<TransactionType>,
    pub reference: Option<String>,
    pub start_sequence: Option<i64>,
    pub end_sequence: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl TransactionQuery {
    pub fn with_account(mut self, account: AccountNumber) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_sequence_range(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start_sequence = start;
        self.end_sequence = end;
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }
}
