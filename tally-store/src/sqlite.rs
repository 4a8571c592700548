use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::debug;

use tally_core::{
    Account, AccountNumber, AccountStatus, AccountType, AuditEntry, LedgerError, LedgerResult,
    LimitEntry, LimitPeriod, LimitType, Transaction, TransactionStatus, TransactionType,
};

use crate::TransactionQuery;

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_number TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_type TEXT NOT NULL,
    balance TEXT NOT NULL,
    currency TEXT NOT NULL,
    status TEXT NOT NULL,
    overdraft_limit TEXT NOT NULL,
    interest_rate TEXT NOT NULL,
    created_at TEXT NOT NULL,
    closed_at TEXT,
    last_transaction_at TEXT,
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference TEXT NOT NULL,
    account_number TEXT NOT NULL REFERENCES accounts(account_number),
    tx_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    balance_before TEXT NOT NULL,
    balance_after TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    related_account TEXT,
    related_transaction INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS tx_idx_account_created
    ON transactions(account_number, created_at);
CREATE INDEX IF NOT EXISTS tx_idx_reference
    ON transactions(reference);
CREATE TABLE IF NOT EXISTS limits (
    account_number TEXT NOT NULL REFERENCES accounts(account_number),
    limit_type TEXT NOT NULL,
    cap TEXT NOT NULL,
    used TEXT NOT NULL,
    period TEXT NOT NULL,
    reset_at TEXT NOT NULL,
    UNIQUE(account_number, limit_type)
);
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL,
    old_values TEXT,
    new_values TEXT,
    created_at TEXT NOT NULL
);
"#;

/// SQLite-backed store. All balance-affecting writes go through
/// [`SqliteStore::unit`], which wraps them in a single IMMEDIATE
/// transaction so an operation either commits whole or not at all.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` with WAL enabled.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside one atomic unit. The closure's writes commit together
    /// on `Ok` and roll back together on `Err`.
    pub fn unit<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&StoreTx { tx: &tx });
        match out {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    debug!(error = %rollback_err, "rollback after failed unit also failed");
                }
                Err(err)
            }
        }
    }

    /// Fetch an account row outside any atomic unit.
    pub fn account(&self, number: &AccountNumber) -> LedgerResult<Option<Account>> {
        let conn = self.conn.lock();
        fetch_account(&conn, number)
    }

    /// Fetch a limit entry outside any atomic unit.
    pub fn limit(
        &self,
        account: &AccountNumber,
        limit_type: LimitType,
    ) -> LedgerResult<Option<LimitEntry>> {
        let conn = self.conn.lock();
        fetch_limit(&conn, account, limit_type)
    }

    /// Highest transaction sequence id persisted so far.
    pub fn latest_sequence(&self) -> LedgerResult<Option<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT MAX(id) FROM transactions")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(row.get::<_, Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    /// Load transactions matching the supplied filter.
    pub fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, reference, account_number, tx_type, amount, balance_before,
                    balance_after, description, status, related_account,
                    related_transaction, created_at
             FROM transactions
             WHERE (?1 IS NULL OR account_number = ?1)
               AND (?2 IS NULL OR tx_type = ?2)
               AND (?3 IS NULL OR reference = ?3)
               AND (?4 IS NULL OR id >= ?4)
               AND (?5 IS NULL OR id <= ?5)
               AND (?6 IS NULL OR created_at >= ?6)
               AND (?7 IS NULL OR created_at <= ?7)",
        );
        sql.push_str(if query.ascending {
            " ORDER BY id ASC"
        } else {
            " ORDER BY id DESC"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?8");
        }

        let mut params: Vec<Value> = Vec::with_capacity(8);
        params.push(optional_text(
            query.account.as_ref().map(|a| a.to_string()),
        ));
        params.push(optional_text(
            query.tx_type.map(|t| t.as_str().to_string()),
        ));
        params.push(optional_text(query.reference.clone()));
        params.push(optional_int(query.start_sequence));
        params.push(optional_int(query.end_sequence));
        params.push(optional_text(query.start_time.map(|ts| ts.to_rfc3339())));
        params.push(optional_text(query.end_time.map(|ts| ts.to_rfc3339())));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_transaction(row)?);
        }
        Ok(out)
    }

    /// Audit trail, optionally filtered to one entity, oldest first.
    pub fn audit_entries(&self, entity_id: Option<&str>) -> LedgerResult<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, action, old_values, new_values, created_at
             FROM audit_log
             WHERE (?1 IS NULL OR entity_id = ?1)
             ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![optional_text(entity_id.map(str::to_owned))])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_audit(row)?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

/// Handle onto one in-flight atomic unit. Every write issued through this
/// handle commits or rolls back together.
pub struct StoreTx<'conn> {
    tx: &'conn rusqlite::Transaction<'conn>,
}

impl StoreTx<'_> {
    pub fn account_exists(&self, number: &AccountNumber) -> LedgerResult<bool> {
        let mut stmt = self
            .tx
            .prepare("SELECT 1 FROM accounts WHERE account_number = ?1")?;
        let mut rows = stmt.query(params![number.as_str()])?;
        Ok(rows.next()?.is_some())
    }

    pub fn fetch_account(&self, number: &AccountNumber) -> LedgerResult<Option<Account>> {
        fetch_account(self.tx, number)
    }

    pub fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        self.tx.execute(
            "INSERT INTO accounts (
                account_number, user_id, account_type, balance, currency, status,
                overdraft_limit, interest_rate, created_at, closed_at,
                last_transaction_at, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                account.number.as_str(),
                account.user.as_str(),
                account.account_type.as_str(),
                account.balance.to_string(),
                account.currency,
                account.status.as_str(),
                account.overdraft_limit.to_string(),
                account.interest_rate.to_string(),
                account.created_at.to_rfc3339(),
                account.closed_at.map(|ts| ts.to_rfc3339()),
                account.last_transaction_at.map(|ts| ts.to_rfc3339()),
                account.version as i64,
            ],
        )?;
        Ok(())
    }

    /// Conditional write: persists the account's mutable fields and bumps the
    /// version, but only if the row still carries the version this struct was
    /// read at. A miss means a concurrent writer got there first.
    pub fn update_account(&self, account: &Account) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE accounts
             SET balance = ?1, status = ?2, closed_at = ?3,
                 last_transaction_at = ?4, version = version + 1
             WHERE account_number = ?5 AND version = ?6",
            params![
                account.balance.to_string(),
                account.status.as_str(),
                account.closed_at.map(|ts| ts.to_rfc3339()),
                account.last_transaction_at.map(|ts| ts.to_rfc3339()),
                account.number.as_str(),
                account.version as i64,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::Conflict(format!(
                "account {} changed underneath the update",
                account.number
            )));
        }
        Ok(())
    }

    /// Append one posting and return its assigned sequence id.
    pub fn insert_transaction(&self, record: &Transaction) -> LedgerResult<i64> {
        self.tx.execute(
            "INSERT INTO transactions (
                reference, account_number, tx_type, amount, balance_before,
                balance_after, description, status, related_account,
                related_transaction, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.reference,
                record.account.as_str(),
                record.tx_type.as_str(),
                record.amount.to_string(),
                record.balance_before.to_string(),
                record.balance_after.to_string(),
                record.description,
                record.status.as_str(),
                record.related_account.as_ref().map(|a| a.to_string()),
                record.related_transaction,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Point the two legs of a transfer at each other. Part of leg creation,
    /// always executed in the same unit as the inserts.
    pub fn link_transfer_legs(&self, debit_id: i64, credit_id: i64) -> LedgerResult<()> {
        self.tx.execute(
            "UPDATE transactions SET related_transaction = ?1 WHERE id = ?2",
            params![credit_id, debit_id],
        )?;
        self.tx.execute(
            "UPDATE transactions SET related_transaction = ?1 WHERE id = ?2",
            params![debit_id, credit_id],
        )?;
        Ok(())
    }

    pub fn fetch_limit(
        &self,
        account: &AccountNumber,
        limit_type: LimitType,
    ) -> LedgerResult<Option<LimitEntry>> {
        fetch_limit(self.tx, account, limit_type)
    }

    pub fn insert_limit(&self, entry: &LimitEntry) -> LedgerResult<()> {
        self.tx.execute(
            "INSERT INTO limits (account_number, limit_type, cap, used, period, reset_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.account.as_str(),
                entry.limit_type.as_str(),
                entry.cap.to_string(),
                entry.used.to_string(),
                entry.period.to_string(),
                entry.reset_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_limit(&self, entry: &LimitEntry) -> LedgerResult<()> {
        self.tx.execute(
            "UPDATE limits SET used = ?1, reset_at = ?2
             WHERE account_number = ?3 AND limit_type = ?4",
            params![
                entry.used.to_string(),
                entry.reset_at.to_rfc3339(),
                entry.account.as_str(),
                entry.limit_type.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Limit entries whose accumulation window lapsed at or before `as_of`.
    pub fn expired_limits(&self, as_of: DateTime<Utc>) -> LedgerResult<Vec<LimitEntry>> {
        let mut stmt = self.tx.prepare(
            "SELECT account_number, limit_type, cap, used, period, reset_at
             FROM limits WHERE reset_at <= ?1",
        )?;
        let mut rows = stmt.query(params![as_of.to_rfc3339()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_limit(row)?);
        }
        Ok(out)
    }

    pub fn insert_audit(&self, entry: &AuditEntry) -> LedgerResult<()> {
        self.tx.execute(
            "INSERT INTO audit_log (entity_type, entity_id, action, old_values, new_values, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.entity_type,
                entry.entity_id,
                entry.action,
                entry.old_values.as_ref().map(|v| v.to_string()),
                entry.new_values.as_ref().map(|v| v.to_string()),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn fetch_account(conn: &Connection, number: &AccountNumber) -> LedgerResult<Option<Account>> {
    let mut stmt = conn.prepare(
        "SELECT account_number, user_id, account_type, balance, currency, status,
                overdraft_limit, interest_rate, created_at, closed_at,
                last_transaction_at, version
         FROM accounts WHERE account_number = ?1",
    )?;
    let mut rows = stmt.query(params![number.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_account(row)?)),
        None => Ok(None),
    }
}

fn fetch_limit(
    conn: &Connection,
    account: &AccountNumber,
    limit_type: LimitType,
) -> LedgerResult<Option<LimitEntry>> {
    let mut stmt = conn.prepare(
        "SELECT account_number, limit_type, cap, used, period, reset_at
         FROM limits WHERE account_number = ?1 AND limit_type = ?2",
    )?;
    let mut rows = stmt.query(params![account.as_str(), limit_type.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_limit(row)?)),
        None => Ok(None),
    }
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn optional_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

fn parse_decimal(text: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(text)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {text}: {err}")))
}

fn parse_timestamp(text: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {text}: {err}")))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> LedgerResult<Account> {
    let number: String = row.get(0)?;
    let user: String = row.get(1)?;
    let account_type: String = row.get(2)?;
    let balance: String = row.get(3)?;
    let currency: String = row.get(4)?;
    let status: String = row.get(5)?;
    let overdraft: String = row.get(6)?;
    let interest: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let closed_at: Option<String> = row.get(9)?;
    let last_transaction_at: Option<String> = row.get(10)?;
    let version: i64 = row.get(11)?;

    Ok(Account {
        number: AccountNumber::from(number),
        user: user.into(),
        account_type: AccountType::from_str(&account_type).map_err(LedgerError::Serialization)?,
        balance: parse_decimal(&balance)?,
        currency,
        status: AccountStatus::from_str(&status).map_err(LedgerError::Serialization)?,
        overdraft_limit: parse_decimal(&overdraft)?,
        interest_rate: parse_decimal(&interest)?,
        created_at: parse_timestamp(&created_at)?,
        closed_at: closed_at.as_deref().map(parse_timestamp).transpose()?,
        last_transaction_at: last_transaction_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        version: version as u64,
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> LedgerResult<Transaction> {
    let id: i64 = row.get(0)?;
    let reference: String = row.get(1)?;
    let account: String = row.get(2)?;
    let tx_type: String = row.get(3)?;
    let amount: String = row.get(4)?;
    let balance_before: String = row.get(5)?;
    let balance_after: String = row.get(6)?;
    let description: String = row.get(7)?;
    let status: String = row.get(8)?;
    let related_account: Option<String> = row.get(9)?;
    let related_transaction: Option<i64> = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(Transaction {
        id,
        reference,
        account: AccountNumber::from(account),
        tx_type: TransactionType::from_str(&tx_type).map_err(LedgerError::Serialization)?,
        amount: parse_decimal(&amount)?,
        balance_before: parse_decimal(&balance_before)?,
        balance_after: parse_decimal(&balance_after)?,
        description,
        status: TransactionStatus::from_str(&status).map_err(LedgerError::Serialization)?,
        related_account: related_account.map(AccountNumber::from),
        related_transaction,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_limit(row: &rusqlite::Row<'_>) -> LedgerResult<LimitEntry> {
    let account: String = row.get(0)?;
    let limit_type: String = row.get(1)?;
    let cap: String = row.get(2)?;
    let used: String = row.get(3)?;
    let period: String = row.get(4)?;
    let reset_at: String = row.get(5)?;

    Ok(LimitEntry {
        account: AccountNumber::from(account),
        limit_type: LimitType::from_str(&limit_type).map_err(LedgerError::Serialization)?,
        cap: parse_decimal(&cap)?,
        used: parse_decimal(&used)?,
        period: LimitPeriod::from_str(&period).map_err(LedgerError::Serialization)?,
        reset_at: parse_timestamp(&reset_at)?,
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> LedgerResult<AuditEntry> {
    let id: i64 = row.get(0)?;
    let entity_type: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let action: String = row.get(3)?;
    let old_values: Option<String> = row.get(4)?;
    let new_values: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;

    let parse_json = |text: String| {
        serde_json::from_str(&text)
            .map_err(|err| LedgerError::Serialization(format!("invalid audit payload: {err}")))
    };
    Ok(AuditEntry {
        id,
        entity_type,
        entity_id,
        action,
        old_values: old_values.map(parse_json).transpose()?,
        new_values: new_values.map(parse_json).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}
