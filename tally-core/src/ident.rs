use chrono::Utc;
use uuid::Uuid;

use crate::account::AccountNumber;

/// Generate a candidate account number: the configured prefix followed by
/// ten digits (a time component for rough ordering, a random tail against
/// same-millisecond collisions). Uniqueness is enforced by the store's
/// UNIQUE constraint; callers regenerate on conflict.
pub fn account_number(prefix: &str) -> AccountNumber {
    let millis = Utc::now().timestamp_millis().unsigned_abs() % 100_000;
    let tail = Uuid::new_v4().as_u128() % 100_000;
    AccountNumber::from(format!("{prefix}{millis:05}{tail:05}"))
}

/// Unique reference token shared by all postings of one ledger operation.
pub fn reference_token() -> String {
    Uuid::new_v4().to_string()
}
