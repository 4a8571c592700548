use std::sync::Arc;
use std::thread;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::{AccountType, LedgerError, TransactionType};
use tally_ledger::{Ledger, LedgerConfig};
use tally_store::{SqliteStore, TransactionQuery};
use tempfile::tempdir;

fn ledger_with(config: LedgerConfig) -> Ledger {
    Ledger::new(Arc::new(SqliteStore::open_in_memory().unwrap()), config)
}

#[test]
fn concurrent_deposits_sum_exactly() {
    let dir = tempdir().unwrap();
    let ledger = Arc::new(
        Ledger::open(dir.path().join("ledger.db"), LedgerConfig::default()).unwrap(),
    );
    let acct = ledger
        .open_account("alice".into(), AccountType::Checking, dec!(10000))
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = Arc::clone(&ledger);
        let number = acct.number.clone();
        handles.push(thread::spawn(move || {
            ledger.deposit(&number, dec!(100), "concurrent").unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let acct = ledger.account(&acct.number).unwrap().unwrap();
    assert_eq!(acct.balance, dec!(10500));

    let deposits = ledger
        .history(
            &TransactionQuery::default()
                .with_account(acct.number.clone())
                .with_type(TransactionType::Deposit),
        )
        .unwrap();
    let concurrent: Vec<_> = deposits
        .iter()
        .filter(|tx| tx.amount == dec!(100))
        .collect();
    assert_eq!(concurrent.len(), 5);
}

#[test]
fn concurrent_withdrawals_never_overdraw() {
    let ledger = Arc::new(ledger_with(LedgerConfig::default()));
    let acct = ledger
        .open_account("bob".into(), AccountType::Checking, dec!(500))
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = Arc::clone(&ledger);
        let number = acct.number.clone();
        handles.push(thread::spawn(move || {
            ledger.withdraw(&number, dec!(100), "race")
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 5);
    assert_eq!(insufficient, 5);

    let acct = ledger.account(&acct.number).unwrap().unwrap();
    assert_eq!(acct.balance, Decimal::ZERO);
}

#[test]
fn opposing_transfers_conserve_total_and_complete() {
    let ledger = Arc::new(ledger_with(LedgerConfig::default()));
    let a = ledger
        .open_account("alice".into(), AccountType::Checking, dec!(1000))
        .unwrap();
    let b = ledger
        .open_account("bob".into(), AccountType::Checking, dec!(1000))
        .unwrap();

    let mut handles = Vec::new();
    for flip in [false, true] {
        let ledger = Arc::clone(&ledger);
        let (from, to) = if flip {
            (b.number.clone(), a.number.clone())
        } else {
            (a.number.clone(), b.number.clone())
        };
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                ledger.transfer(&from, &to, dec!(10), "ping-pong").unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let a = ledger.account(&a.number).unwrap().unwrap();
    let b = ledger.account(&b.number).unwrap().unwrap();
    assert_eq!(a.balance + b.balance, dec!(2000));
}

#[test]
fn mixed_operations_conserve_net_flow() {
    let ledger = ledger_with(LedgerConfig::default());
    let a = ledger
        .open_account("alice".into(), AccountType::Checking, dec!(100))
        .unwrap();
    let b = ledger
        .open_account("bob".into(), AccountType::Checking, dec!(200))
        .unwrap();

    ledger.deposit(&a.number, dec!(400), "pay").unwrap();
    ledger.withdraw(&b.number, dec!(50), "cash").unwrap();
    ledger.transfer(&a.number, &b.number, dec!(125), "split").unwrap();
    ledger.transfer(&b.number, &a.number, dec!(25), "refund").unwrap();

    let a = ledger.account(&a.number).unwrap().unwrap();
    let b = ledger.account(&b.number).unwrap().unwrap();
    // Opening 300 total, +400 deposited, -50 withdrawn; transfers are neutral.
    assert_eq!(a.balance + b.balance, dec!(650));
}
