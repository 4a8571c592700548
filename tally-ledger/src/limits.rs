use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_core::{AccountNumber, LedgerError, LedgerResult, LimitPeriod, LimitType};
use tally_store::StoreTx;
use tracing::debug;

/// Check an accumulating limit and reserve `amount` against it, inside the
/// caller's atomic unit. A missing entry means the account carries no cap of
/// this type. An expired window counts as empty and is re-opened from `now`.
pub(crate) fn check_and_reserve(
    stx: &StoreTx<'_>,
    account: &AccountNumber,
    limit_type: LimitType,
    amount: Decimal,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    let Some(mut entry) = stx.fetch_limit(account, limit_type)? else {
        return Ok(());
    };

    if entry.period == LimitPeriod::PerTransaction {
        // Per-transaction caps never accumulate.
        if amount > entry.cap {
            return Err(limit_exceeded(account, &entry, Decimal::ZERO, amount));
        }
        return Ok(());
    }

    let used = entry.effective_usage(now);
    if used + amount > entry.cap {
        return Err(limit_exceeded(account, &entry, used, amount));
    }

    if entry.expired(now) {
        entry.used = amount;
        entry.reset_at = entry.period.next_reset(now);
    } else {
        entry.used = used + amount;
    }
    stx.update_limit(&entry)
}

fn limit_exceeded(
    account: &AccountNumber,
    entry: &tally_core::LimitEntry,
    used: Decimal,
    requested: Decimal,
) -> LedgerError {
    LedgerError::LimitExceeded {
        account: account.to_string(),
        limit_type: entry.limit_type,
        cap: entry.cap,
        used,
        requested,
    }
}

/// Zero the usage of every limit entry whose window lapsed by `as_of` and
/// advance its reset timestamp. Returns the number of entries reset.
pub(crate) fn reset_expired(stx: &StoreTx<'_>, as_of: DateTime<Utc>) -> LedgerResult<usize> {
    let expired = stx.expired_limits(as_of)?;
    let count = expired.len();
    for mut entry in expired {
        entry.used = Decimal::ZERO;
        entry.reset_at = entry.period.next_reset(as_of);
        stx.update_limit(&entry)?;
        debug!(
            account = %entry.account,
            limit_type = %entry.limit_type,
            next_reset = %entry.reset_at,
            "limit window reset"
        );
    }
    Ok(count)
}
