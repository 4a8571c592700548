use serde_json::json;
use tally_core::{Account, AuditEntry, LedgerResult};
use tally_store::StoreTx;

/// JSON snapshot of an account's audited fields.
pub(crate) fn account_snapshot(account: &Account) -> serde_json::Value {
    json!({
        "balance": account.balance.to_string(),
        "status": account.status.as_str(),
        "version": account.version,
    })
}

/// Append one audit record inside the caller's atomic unit, so the trail
/// cannot diverge from the state it documents.
pub(crate) fn record(
    stx: &StoreTx<'_>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    old_values: Option<serde_json::Value>,
    new_values: Option<serde_json::Value>,
) -> LedgerResult<()> {
    stx.insert_audit(&AuditEntry::new(
        entity_type,
        entity_id,
        action,
        old_values,
        new_values,
    ))
}
