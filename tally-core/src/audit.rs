use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only compliance record of a state change. Written in the same
/// atomic unit as the mutation it documents and never read by the ledger
/// itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            old_values,
            new_values,
            created_at: Utc::now(),
        }
    }
}
