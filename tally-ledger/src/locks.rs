use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tally_core::{AccountNumber, LedgerError, LedgerResult};

type Guard = ArcMutexGuard<RawMutex, ()>;

/// Per-account exclusive locks. Every ledger operation holds the lock of
/// each account it mutates for the full span of its atomic unit.
///
/// Multi-account acquisition always proceeds in ascending account-number
/// order, so two transfers over the same pair in opposite directions cannot
/// deadlock on each other.
pub struct LockTable {
    entries: Mutex<HashMap<AccountNumber, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// Guards for one operation's account set; unlocks on drop.
pub struct AccountGuards {
    _guards: Vec<Guard>,
}

impl std::fmt::Debug for AccountGuards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountGuards")
            .field("held", &self._guards.len())
            .finish_non_exhaustive()
    }
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn handle(&self, account: &AccountNumber) -> Arc<Mutex<()>> {
        let mut entries = self.entries.lock();
        entries.entry(account.clone()).or_default().clone()
    }

    /// Acquire the locks for `accounts` in canonical order. Duplicates are
    /// collapsed. On timeout every already-held guard is released and the
    /// caller gets `Conflict`; nothing was mutated yet at that point.
    pub fn acquire(&self, accounts: &[&AccountNumber]) -> LedgerResult<AccountGuards> {
        let mut ordered: Vec<&AccountNumber> = accounts.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for account in ordered {
            let handle = self.handle(account);
            match handle.try_lock_arc_for(self.timeout) {
                Some(guard) => guards.push(guard),
                None => {
                    return Err(LedgerError::Conflict(format!(
                        "account {account} is locked by another operation"
                    )))
                }
            }
        }
        Ok(AccountGuards { _guards: guards })
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn disjoint_accounts_lock_independently() {
        let table = LockTable::new(Duration::from_millis(50));
        let a = AccountNumber::from("ACC1");
        let b = AccountNumber::from("ACC2");
        let _first = table.acquire(&[&a]).unwrap();
        let _second = table.acquire(&[&b]).unwrap();
    }

    #[test]
    fn contended_account_times_out() {
        let table = LockTable::new(Duration::from_millis(20));
        let a = AccountNumber::from("ACC1");
        let held = table.acquire(&[&a]).unwrap();
        let err = table.acquire(&[&a]).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        drop(held);
        table.acquire(&[&a]).unwrap();
    }

    #[test]
    fn duplicate_accounts_do_not_self_deadlock() {
        let table = LockTable::new(Duration::from_millis(20));
        let a = AccountNumber::from("ACC1");
        let _guards = table.acquire(&[&a, &a]).unwrap();
    }

    #[test]
    fn opposite_order_pairs_do_not_deadlock() {
        let table = Arc::new(LockTable::new(Duration::from_secs(2)));
        let mut handles = Vec::new();
        for flip in [false, true] {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                let a = AccountNumber::from("ACC1");
                let b = AccountNumber::from("ACC2");
                for _ in 0..200 {
                    let pair = if flip { [&b, &a] } else { [&a, &b] };
                    let guards = table.acquire(&pair).unwrap();
                    drop(guards);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
