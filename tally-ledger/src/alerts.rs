use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{AccountNumber, UserId};
use tokio::sync::broadcast;
use tracing::debug;

/// Threshold-triggered notification kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LargeDeposit,
    LowBalance,
    TransferReceived,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
}

/// Fire-and-forget notification emitted by a committed ledger operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub user: UserId,
    pub account: AccountNumber,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        user: UserId,
        account: AccountNumber,
        kind: AlertKind,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user,
            account,
            kind,
            severity,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Broadcast channel carrying alerts to notification consumers. Publishing
/// never blocks and never fails the ledger operation that raised the alert;
/// with no subscribers the alert is simply dropped.
pub struct AlertBus {
    sender: broadcast::Sender<Alert>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> AlertStream {
        AlertStream {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, alert: Alert) {
        debug!(
            account = %alert.account,
            kind = ?alert.kind,
            "publishing alert"
        );
        let _ = self.sender.send(alert);
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct AlertStream {
    receiver: broadcast::Receiver<Alert>,
}

impl AlertStream {
    pub async fn recv(&mut self) -> Result<Alert, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, for synchronous callers and tests.
    pub fn try_recv(&mut self) -> Option<Alert> {
        self.receiver.try_recv().ok()
    }
}
