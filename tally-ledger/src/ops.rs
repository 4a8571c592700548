use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::{
    account_number, reference_token, validate_amount, Account, AccountNumber, AccountStatus,
    AccountType, LedgerError, LedgerResult, LimitEntry, LimitType, Transaction, TransactionType,
    UserId, AMOUNT_SCALE,
};
use tally_store::{SqliteStore, StoreTx, TransactionQuery};
use tracing::info;

use crate::alerts::{Alert, AlertBus, AlertKind, AlertSeverity};
use crate::locks::LockTable;
use crate::{audit, limits};

const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

/// Thresholds and defaults governing the ledger engine.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub account_prefix: String,
    pub currency: String,
    pub lock_timeout: Duration,
    pub large_deposit_threshold: Decimal,
    pub low_balance_threshold: Decimal,
    pub default_overdraft: Decimal,
    pub savings_interest_rate: Decimal,
    pub business_interest_rate: Decimal,
    pub daily_withdrawal_cap: Decimal,
    pub daily_transfer_cap: Decimal,
    pub single_transaction_cap: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            account_prefix: "ACC".into(),
            currency: "USD".into(),
            lock_timeout: Duration::from_secs(5),
            large_deposit_threshold: Decimal::new(10_000, 0),
            low_balance_threshold: Decimal::new(100, 0),
            default_overdraft: Decimal::ZERO,
            savings_interest_rate: Decimal::new(25, 3),
            business_interest_rate: Decimal::new(15, 3),
            daily_withdrawal_cap: Decimal::new(2_000, 0),
            daily_transfer_cap: Decimal::new(5_000, 0),
            single_transaction_cap: Decimal::new(10_000, 0),
        }
    }
}

impl LedgerConfig {
    /// Annual interest rate seeded onto new accounts of the given type.
    pub fn interest_rate_for(&self, account_type: AccountType) -> Decimal {
        match account_type {
            AccountType::Savings => self.savings_interest_rate,
            AccountType::Business => self.business_interest_rate,
            AccountType::Checking => Decimal::ZERO,
        }
    }
}

/// Outcome of a single-account posting (deposit, withdrawal, interest).
#[derive(Clone, Debug, Serialize)]
pub struct PostingReceipt {
    pub transaction_id: i64,
    pub reference: String,
    pub balance: Decimal,
}

/// Outcome of a committed transfer: both legs plus both new balances.
#[derive(Clone, Debug, Serialize)]
pub struct TransferReceipt {
    pub debit_transaction_id: i64,
    pub credit_transaction_id: i64,
    pub reference: String,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

/// The transactional ledger engine.
///
/// Every operation is one atomic unit: it takes the per-account locks it
/// needs (in canonical order), reads fresh state inside a single storage
/// transaction, validates every invariant before the first write lands, and
/// commits the account update, the posting, the limit reservation and the
/// audit record together. Alerts are published only after commit, outside
/// the critical section.
pub struct Ledger {
    store: Arc<SqliteStore>,
    locks: LockTable,
    alerts: AlertBus,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(store: Arc<SqliteStore>, config: LedgerConfig) -> Self {
        let locks = LockTable::new(config.lock_timeout);
        Self {
            store,
            locks,
            alerts: AlertBus::default(),
            config,
        }
    }

    /// Open (or create) a ledger database at `path`.
    pub fn open(path: impl Into<PathBuf>, config: LedgerConfig) -> LedgerResult<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open(path)?), config))
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn alerts(&self) -> &AlertBus {
        &self.alerts
    }

    pub fn account(&self, number: &AccountNumber) -> LedgerResult<Option<Account>> {
        self.store.account(number)
    }

    pub fn history(&self, query: &TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        self.store.transactions(query)
    }

    /// Create a new active account with a freshly generated number, default
    /// limit entries, and (for a positive opening balance) an initial
    /// deposit posting.
    pub fn open_account(
        &self,
        user: UserId,
        account_type: AccountType,
        initial_balance: Decimal,
    ) -> LedgerResult<Account> {
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "opening balance may not be negative, got {initial_balance}"
            )));
        }
        if !initial_balance.is_zero() {
            validate_amount(initial_balance)?;
        }

        let now = Utc::now();
        let account = self.store.unit(|stx| {
            let mut number = account_number(&self.config.account_prefix);
            let mut attempts = 1;
            while stx.account_exists(&number)? {
                if attempts >= ACCOUNT_NUMBER_ATTEMPTS {
                    return Err(LedgerError::Storage(format!(
                        "could not generate an unused account number after {attempts} attempts"
                    )));
                }
                number = account_number(&self.config.account_prefix);
                attempts += 1;
            }

            let account = Account {
                number: number.clone(),
                user,
                account_type,
                balance: initial_balance,
                currency: self.config.currency.clone(),
                status: AccountStatus::Active,
                overdraft_limit: self.config.default_overdraft,
                interest_rate: self.config.interest_rate_for(account_type),
                created_at: now,
                closed_at: None,
                last_transaction_at: None,
                version: 1,
            };
            stx.insert_account(&account)?;

            if !initial_balance.is_zero() {
                stx.insert_transaction(&Transaction::completed(
                    number.clone(),
                    TransactionType::Deposit,
                    initial_balance,
                    Decimal::ZERO,
                    initial_balance,
                    reference_token(),
                    "initial deposit",
                ))?;
            }

            for (limit_type, cap) in [
                (LimitType::DailyWithdrawal, self.config.daily_withdrawal_cap),
                (LimitType::DailyTransfer, self.config.daily_transfer_cap),
                (
                    LimitType::SingleTransaction,
                    self.config.single_transaction_cap,
                ),
            ] {
                stx.insert_limit(&LimitEntry::new(number.clone(), limit_type, cap, now))?;
            }

            audit::record(
                stx,
                "account_opened",
                "account",
                number.as_str(),
                None,
                Some(audit::account_snapshot(&account)),
            )?;
            Ok(account)
        })?;

        info!(account = %account.number, user = %account.user, balance = %account.balance, "account opened");
        Ok(account)
    }

    /// Credit `amount` onto an active account.
    pub fn deposit(
        &self,
        account: &AccountNumber,
        amount: Decimal,
        description: &str,
    ) -> LedgerResult<PostingReceipt> {
        let amount = validate_amount(amount)?;
        let reference = reference_token();
        let guards = self.locks.acquire(&[account])?;
        let result = self.store.unit(|stx| {
            let acct = require_active(stx, account)?;
            let (id, balance) = post_leg(
                stx,
                &acct,
                TransactionType::Deposit,
                amount,
                amount,
                &reference,
                description,
                None,
            )?;
            Ok((
                PostingReceipt {
                    transaction_id: id,
                    reference: reference.clone(),
                    balance,
                },
                acct.user,
            ))
        });
        drop(guards);
        let (receipt, user) = result?;

        info!(account = %account, amount = %amount, tx = receipt.transaction_id, "deposit committed");
        if amount > self.config.large_deposit_threshold {
            self.alerts.publish(Alert::new(
                user,
                account.clone(),
                AlertKind::LargeDeposit,
                AlertSeverity::Info,
                format!("deposit of {amount} exceeds the large transaction threshold"),
            ));
        }
        Ok(receipt)
    }

    /// Debit `amount` from an active account, respecting the overdraft floor
    /// and the account's withdrawal limits.
    pub fn withdraw(
        &self,
        account: &AccountNumber,
        amount: Decimal,
        description: &str,
    ) -> LedgerResult<PostingReceipt> {
        let amount = validate_amount(amount)?;
        let reference = reference_token();
        let now = Utc::now();
        let guards = self.locks.acquire(&[account])?;
        let result = self.store.unit(|stx| {
            let acct = require_active(stx, account)?;
            if acct.balance - amount < acct.floor() {
                return Err(LedgerError::InsufficientFunds {
                    account: acct.number.to_string(),
                    available: acct.available(),
                    requested: amount,
                });
            }
            limits::check_and_reserve(stx, account, LimitType::SingleTransaction, amount, now)?;
            limits::check_and_reserve(stx, account, LimitType::DailyWithdrawal, amount, now)?;
            let (id, balance) = post_leg(
                stx,
                &acct,
                TransactionType::Withdrawal,
                amount,
                -amount,
                &reference,
                description,
                None,
            )?;
            Ok((
                PostingReceipt {
                    transaction_id: id,
                    reference: reference.clone(),
                    balance,
                },
                acct.user,
            ))
        });
        drop(guards);
        let (receipt, user) = result?;

        info!(account = %account, amount = %amount, tx = receipt.transaction_id, "withdrawal committed");
        if receipt.balance < self.config.low_balance_threshold {
            self.alerts.publish(Alert::new(
                user,
                account.clone(),
                AlertKind::LowBalance,
                AlertSeverity::Warning,
                format!("balance {} is below the low balance threshold", receipt.balance),
            ));
        }
        Ok(receipt)
    }

    /// Move `amount` between two active accounts as one atomic unit: a debit
    /// leg and a credit leg sharing a reference and linked to each other.
    pub fn transfer(
        &self,
        from: &AccountNumber,
        to: &AccountNumber,
        amount: Decimal,
        description: &str,
    ) -> LedgerResult<TransferReceipt> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let amount = validate_amount(amount)?;
        let reference = reference_token();
        let now = Utc::now();
        let guards = self.locks.acquire(&[from, to])?;
        let result = self.store.unit(|stx| {
            // Balances must be re-read under the locks; anything read before
            // acquisition may be stale.
            let src = require_active(stx, from)?;
            let dst = require_active(stx, to)?;
            if src.balance - amount < src.floor() {
                return Err(LedgerError::InsufficientFunds {
                    account: src.number.to_string(),
                    available: src.available(),
                    requested: amount,
                });
            }
            limits::check_and_reserve(stx, from, LimitType::SingleTransaction, amount, now)?;
            limits::check_and_reserve(stx, from, LimitType::DailyTransfer, amount, now)?;

            let (debit_id, from_balance) = post_leg(
                stx,
                &src,
                TransactionType::Transfer,
                amount,
                -amount,
                &reference,
                description,
                Some(to.clone()),
            )?;
            let (credit_id, to_balance) = post_leg(
                stx,
                &dst,
                TransactionType::Transfer,
                amount,
                amount,
                &reference,
                description,
                Some(from.clone()),
            )?;
            stx.link_transfer_legs(debit_id, credit_id)?;

            Ok((
                TransferReceipt {
                    debit_transaction_id: debit_id,
                    credit_transaction_id: credit_id,
                    reference: reference.clone(),
                    from_balance,
                    to_balance,
                },
                dst.user,
            ))
        });
        drop(guards);
        let (receipt, recipient) = result?;

        info!(
            from = %from,
            to = %to,
            amount = %amount,
            reference = %receipt.reference,
            "transfer committed"
        );
        self.alerts.publish(Alert::new(
            recipient,
            to.clone(),
            AlertKind::TransferReceived,
            AlertSeverity::Info,
            format!("received transfer of {amount}"),
        ));
        Ok(receipt)
    }

    /// Close an active account holding exactly zero balance. The row is kept
    /// forever; only the status changes.
    pub fn close_account(&self, account: &AccountNumber, reason: &str) -> LedgerResult<bool> {
        let guards = self.locks.acquire(&[account])?;
        let result = self.store.unit(|stx| {
            let acct = match stx.fetch_account(account)? {
                Some(acct) if acct.status.can_become(AccountStatus::Closed) => acct,
                _ => return Err(LedgerError::AccountNotFound(account.to_string())),
            };
            if !acct.balance.is_zero() {
                return Err(LedgerError::NonZeroBalance {
                    account: acct.number.to_string(),
                    balance: acct.balance,
                });
            }
            let mut updated = acct.clone();
            updated.status = AccountStatus::Closed;
            updated.closed_at = Some(Utc::now());
            stx.update_account(&updated)?;
            updated.version += 1;
            audit::record(
                stx,
                "account_closed",
                "account",
                acct.number.as_str(),
                Some(audit::account_snapshot(&acct)),
                Some(serde_json::json!({
                    "status": updated.status.as_str(),
                    "version": updated.version,
                    "reason": reason,
                })),
            )?;
            Ok(true)
        });
        drop(guards);
        let closed = result?;
        info!(account = %account, reason, "account closed");
        Ok(closed)
    }

    /// Credit one month of interest onto an account, using its stored annual
    /// rate. Returns `None` when nothing accrues (zero rate, non-positive
    /// balance, or an accrual that rounds to zero).
    pub fn post_interest(&self, account: &AccountNumber) -> LedgerResult<Option<PostingReceipt>> {
        let reference = reference_token();
        let guards = self.locks.acquire(&[account])?;
        let result = self.store.unit(|stx| {
            let acct = require_active(stx, account)?;
            if acct.interest_rate <= Decimal::ZERO || acct.balance <= Decimal::ZERO {
                return Ok(None);
            }
            let accrual =
                (acct.balance * acct.interest_rate / Decimal::from(12)).round_dp(AMOUNT_SCALE);
            if accrual.is_zero() {
                return Ok(None);
            }
            let (id, balance) = post_leg(
                stx,
                &acct,
                TransactionType::Interest,
                accrual,
                accrual,
                &reference,
                "monthly interest accrual",
                None,
            )?;
            Ok(Some(PostingReceipt {
                transaction_id: id,
                reference: reference.clone(),
                balance,
            }))
        });
        drop(guards);
        let receipt = result?;
        if let Some(receipt) = &receipt {
            info!(account = %account, tx = receipt.transaction_id, balance = %receipt.balance, "interest posted");
        }
        Ok(receipt)
    }

    /// Zero every limit window that expired by `as_of`. Invoked by an
    /// external periodic sweep, not by the ledger operations themselves.
    pub fn sweep_limits(&self, as_of: DateTime<Utc>) -> LedgerResult<usize> {
        let count = self.store.unit(|stx| limits::reset_expired(stx, as_of))?;
        if count > 0 {
            info!(count, "expired limit windows reset");
        }
        Ok(count)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn require_active(stx: &StoreTx<'_>, number: &AccountNumber) -> LedgerResult<Account> {
    match stx.fetch_account(number)? {
        Some(acct) if acct.status.can_transact() => Ok(acct),
        _ => Err(LedgerError::AccountNotFound(number.to_string())),
    }
}

/// Apply one posting to one account inside the caller's atomic unit: insert
/// the transaction row, move the balance (conditional on the row version),
/// and record the audit snapshot pair.
#[allow(clippy::too_many_arguments)]
fn post_leg(
    stx: &StoreTx<'_>,
    acct: &Account,
    tx_type: TransactionType,
    amount: Decimal,
    signed_delta: Decimal,
    reference: &str,
    description: &str,
    related: Option<AccountNumber>,
) -> LedgerResult<(i64, Decimal)> {
    let after = acct.balance + signed_delta;
    let mut record = Transaction::completed(
        acct.number.clone(),
        tx_type,
        amount,
        acct.balance,
        after,
        reference,
        description,
    );
    if let Some(related) = related {
        record = record.with_related_account(related);
    }
    let id = stx.insert_transaction(&record)?;

    let mut updated = acct.clone();
    updated.balance = after;
    updated.last_transaction_at = Some(record.created_at);
    stx.update_account(&updated)?;
    updated.version += 1;

    audit::record(
        stx,
        "balance_change",
        "account",
        acct.number.as_str(),
        Some(audit::account_snapshot(acct)),
        Some(audit::account_snapshot(&updated)),
    )?;
    Ok((id, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_store::SqliteStore;

    fn test_ledger() -> Ledger {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        Ledger::new(store, LedgerConfig::default())
    }

    fn funded_account(ledger: &Ledger, balance: Decimal) -> Account {
        ledger
            .open_account("user-1".into(), AccountType::Checking, balance)
            .unwrap()
    }

    #[test]
    fn deposit_then_withdraw_then_transfer_scenario() {
        let ledger = test_ledger();
        let acct1 = ledger
            .open_account("alice".into(), AccountType::Checking, Decimal::ZERO)
            .unwrap();
        let acct2 = ledger
            .open_account("bob".into(), AccountType::Checking, dec!(500))
            .unwrap();

        let receipt = ledger.deposit(&acct1.number, dec!(1000), "init").unwrap();
        assert_eq!(receipt.balance, dec!(1000));

        let receipt = ledger.withdraw(&acct1.number, dec!(300), "atm").unwrap();
        assert_eq!(receipt.balance, dec!(700));

        let receipt = ledger
            .transfer(&acct1.number, &acct2.number, dec!(200), "x")
            .unwrap();
        assert_eq!(receipt.from_balance, dec!(500));
        assert_eq!(receipt.to_balance, dec!(700));

        let acct1_rows = ledger
            .history(&TransactionQuery::default().with_account(acct1.number.clone()))
            .unwrap();
        let acct2_rows = ledger
            .history(&TransactionQuery::default().with_account(acct2.number.clone()))
            .unwrap();
        // 1 deposit + 1 withdrawal + 2 transfer legs; bob's opening balance
        // adds his initial deposit row.
        assert_eq!(acct1_rows.len() + acct2_rows.len(), 5);
    }

    #[test]
    fn deposit_rejects_missing_and_inactive_accounts() {
        let ledger = test_ledger();
        let missing = AccountNumber::from("ACC0000000000");
        assert!(matches!(
            ledger.deposit(&missing, dec!(10), "x"),
            Err(LedgerError::AccountNotFound(_))
        ));

        let acct = funded_account(&ledger, Decimal::ZERO);
        ledger.close_account(&acct.number, "done").unwrap();
        assert!(matches!(
            ledger.deposit(&acct.number, dec!(10), "x"),
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[test]
    fn withdraw_honors_overdraft_floor() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(50));
        let err = ledger.withdraw(&acct.number, dec!(50.01), "x").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        // Balance untouched and no posting recorded beyond the opener.
        let acct = ledger.account(&acct.number).unwrap().unwrap();
        assert_eq!(acct.balance, dec!(50));
    }

    #[test]
    fn overdraft_allows_negative_balance_down_to_floor() {
        let config = LedgerConfig {
            default_overdraft: dec!(100),
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new(Arc::new(SqliteStore::open_in_memory().unwrap()), config);
        let acct = ledger
            .open_account("user-1".into(), AccountType::Checking, dec!(50))
            .unwrap();

        let receipt = ledger.withdraw(&acct.number, dec!(50.01), "dip").unwrap();
        assert_eq!(receipt.balance, dec!(-0.01));

        // A negative balance is just as non-zero as a positive one.
        let err = ledger.close_account(&acct.number, "bye").unwrap_err();
        assert!(matches!(err, LedgerError::NonZeroBalance { .. }));

        let err = ledger.withdraw(&acct.number, dec!(100), "too deep").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        let acct_row = ledger.account(&acct.number).unwrap().unwrap();
        assert_eq!(acct_row.balance, dec!(-0.01));

        // Landing exactly on the floor is still allowed.
        let receipt = ledger
            .withdraw(&acct.number, dec!(99.99), "to the floor")
            .unwrap();
        assert_eq!(receipt.balance, dec!(-100.00));
    }

    #[test]
    fn withdraw_enforces_daily_limit_atomically() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(9000));
        ledger.withdraw(&acct.number, dec!(1500), "first").unwrap();
        let err = ledger.withdraw(&acct.number, dec!(600), "second").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::LimitExceeded {
                limit_type: LimitType::DailyWithdrawal,
                ..
            }
        ));
        // The failed attempt must not have debited anything.
        let acct = ledger.account(&acct.number).unwrap().unwrap();
        assert_eq!(acct.balance, dec!(7500));
    }

    #[test]
    fn transfer_rejects_self_and_missing_destination() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(100));
        assert!(matches!(
            ledger.transfer(&acct.number, &acct.number, dec!(10), "x"),
            Err(LedgerError::SelfTransfer)
        ));

        let missing = AccountNumber::from("ACC0000000000");
        let err = ledger
            .transfer(&acct.number, &missing, dec!(10), "x")
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
        // Source untouched by the failed transfer.
        let acct = ledger.account(&acct.number).unwrap().unwrap();
        assert_eq!(acct.balance, dec!(100));
    }

    #[test]
    fn transfer_legs_share_reference_and_link() {
        let ledger = test_ledger();
        let from = funded_account(&ledger, dec!(300));
        let to = ledger
            .open_account("user-2".into(), AccountType::Savings, Decimal::ZERO)
            .unwrap();
        let receipt = ledger
            .transfer(&from.number, &to.number, dec!(120), "rent")
            .unwrap();

        let legs = ledger
            .history(
                &TransactionQuery::default()
                    .with_reference(receipt.reference.clone())
                    .ascending(),
            )
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs[0].is_debit());
        assert!(!legs[1].is_debit());
        assert_eq!(legs[0].related_transaction, Some(legs[1].id));
        assert_eq!(legs[1].related_transaction, Some(legs[0].id));
        assert_eq!(legs[0].related_account, Some(to.number.clone()));
        assert_eq!(legs[1].related_account, Some(from.number.clone()));
    }

    #[test]
    fn close_requires_exact_zero_balance() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(0.01));
        let err = ledger.close_account(&acct.number, "bye").unwrap_err();
        assert!(matches!(err, LedgerError::NonZeroBalance { .. }));

        ledger.withdraw(&acct.number, dec!(0.01), "drain").unwrap();
        assert!(ledger.close_account(&acct.number, "bye").unwrap());
        let acct = ledger.account(&acct.number).unwrap().unwrap();
        assert_eq!(acct.status, AccountStatus::Closed);
        assert!(acct.closed_at.is_some());
    }

    #[test]
    fn close_follows_status_transition_rules() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, Decimal::ZERO);

        let mut frozen = ledger.account(&acct.number).unwrap().unwrap();
        frozen.status = AccountStatus::Frozen;
        ledger.store().unit(|tx| tx.update_account(&frozen)).unwrap();
        assert!(matches!(
            ledger.close_account(&acct.number, "frozen").unwrap_err(),
            LedgerError::AccountNotFound(_)
        ));

        let mut thawed = ledger.account(&acct.number).unwrap().unwrap();
        thawed.status = AccountStatus::Active;
        ledger.store().unit(|tx| tx.update_account(&thawed)).unwrap();
        assert!(ledger.close_account(&acct.number, "done").unwrap());
        assert!(matches!(
            ledger.close_account(&acct.number, "again").unwrap_err(),
            LedgerError::AccountNotFound(_)
        ));
    }

    #[test]
    fn open_account_seeds_default_limits() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(10));
        for limit_type in [
            LimitType::DailyWithdrawal,
            LimitType::DailyTransfer,
            LimitType::SingleTransaction,
        ] {
            let entry = ledger
                .store()
                .limit(&acct.number, limit_type)
                .unwrap()
                .unwrap();
            assert_eq!(entry.used, Decimal::ZERO);
        }
    }

    #[test]
    fn open_account_rejects_negative_opening_balance() {
        let ledger = test_ledger();
        let err = ledger
            .open_account("user-1".into(), AccountType::Checking, dec!(-1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn interest_accrues_monthly_on_savings() {
        let ledger = test_ledger();
        let acct = ledger
            .open_account("user-1".into(), AccountType::Savings, dec!(1200))
            .unwrap();
        let receipt = ledger.post_interest(&acct.number).unwrap().unwrap();
        // 1200 * 0.025 / 12 = 2.50
        assert_eq!(receipt.balance, dec!(1202.50));

        let postings = ledger
            .history(
                &TransactionQuery::default()
                    .with_account(acct.number.clone())
                    .with_type(TransactionType::Interest),
            )
            .unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].amount, dec!(2.50));
    }

    #[test]
    fn interest_skips_zero_rate_accounts() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, dec!(1200));
        assert!(ledger.post_interest(&acct.number).unwrap().is_none());
    }

    #[test]
    fn alerts_fire_after_commit() {
        let config = LedgerConfig {
            daily_withdrawal_cap: dec!(100000),
            single_transaction_cap: dec!(100000),
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new(Arc::new(SqliteStore::open_in_memory().unwrap()), config);
        let mut stream = ledger.alerts().subscribe();
        let acct = ledger
            .open_account("user-1".into(), AccountType::Checking, Decimal::ZERO)
            .unwrap();

        // Exactly at the threshold stays quiet; only amounts beyond it alert.
        ledger
            .deposit(&acct.number, dec!(10000), "at threshold")
            .unwrap();
        assert!(stream.try_recv().is_none());

        ledger.deposit(&acct.number, dec!(15000), "bonus").unwrap();
        let alert = stream.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::LargeDeposit);

        ledger.withdraw(&acct.number, dec!(24950), "spend").unwrap();
        let alert = stream.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::LowBalance);
    }

    #[test]
    fn audit_trail_records_every_balance_change() {
        let ledger = test_ledger();
        let acct = funded_account(&ledger, Decimal::ZERO);
        ledger.deposit(&acct.number, dec!(100), "a").unwrap();
        ledger.withdraw(&acct.number, dec!(40), "b").unwrap();

        let trail = ledger
            .store()
            .audit_entries(Some(acct.number.as_str()))
            .unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["account_opened", "balance_change", "balance_change"]);
    }
}
