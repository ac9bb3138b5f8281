use alloy::primitives::{Address, B256};
use serde::Serialize;
use std::time::SystemTime;

use crate::ledger::{EmittedEvent, Inclusion};

/// Lifecycle state of a submitted transaction.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
    Dropped { reason: String },
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// What the ledger reported once the transaction was included successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub events: Vec<EmittedEvent>,
}

impl From<Inclusion> for ConfirmationResult {
    fn from(inclusion: Inclusion) -> Self {
        Self {
            block_number: inclusion.block_number,
            gas_used: inclusion.gas_used,
            events: inclusion.events,
        }
    }
}

/// Tracked lifecycle of one submitted transaction.
///
/// Status only moves forward: once terminal, every transition is refused and
/// the record stays as it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    id: B256,
    label: String,
    sender: Option<Address>,
    status: TxStatus,
    #[serde(serialize_with = "unix_millis")]
    submitted_at: SystemTime,
    #[serde(serialize_with = "unix_millis_opt")]
    last_checked_at: Option<SystemTime>,
    #[serde(serialize_with = "unix_millis_opt")]
    settled_at: Option<SystemTime>,
    checks: u32,
    result: Option<ConfirmationResult>,
}

impl TransactionRecord {
    pub(crate) fn pending(id: B256, label: impl Into<String>, sender: Option<Address>) -> Self {
        Self {
            id,
            label: label.into(),
            sender,
            status: TxStatus::Pending,
            submitted_at: SystemTime::now(),
            last_checked_at: None,
            settled_at: None,
            checks: 0,
            result: None,
        }
    }

    pub fn id(&self) -> B256 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sender(&self) -> Option<Address> {
        self.sender
    }

    pub fn status(&self) -> &TxStatus {
        &self.status
    }

    pub fn submitted_at(&self) -> SystemTime {
        self.submitted_at
    }

    pub fn last_checked_at(&self) -> Option<SystemTime> {
        self.last_checked_at
    }

    /// When the record reached a terminal state.
    pub fn settled_at(&self) -> Option<SystemTime> {
        self.settled_at
    }

    /// Number of receipt lookups performed so far.
    pub fn checks(&self) -> u32 {
        self.checks
    }

    pub fn result(&self) -> Option<&ConfirmationResult> {
        self.result.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reason attached to a Failed or Dropped record.
    pub fn reason(&self) -> Option<&str> {
        match &self.status {
            TxStatus::Failed { reason } | TxStatus::Dropped { reason } => Some(reason),
            _ => None,
        }
    }

    /// Count a receipt lookup. Ignored once the record is terminal.
    pub(crate) fn note_check(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.checks += 1;
        self.last_checked_at = Some(SystemTime::now());
    }

    pub(crate) fn confirm(&mut self, result: ConfirmationResult) -> bool {
        if !self.settle(TxStatus::Confirmed) {
            return false;
        }
        self.result = Some(result);
        true
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.settle(TxStatus::Failed {
            reason: reason.into(),
        })
    }

    pub(crate) fn drop_with(&mut self, reason: impl Into<String>) -> bool {
        self.settle(TxStatus::Dropped {
            reason: reason.into(),
        })
    }

    fn settle(&mut self, next: TxStatus) -> bool {
        if self.is_terminal() || !next.is_terminal() {
            return false;
        }
        self.status = next;
        self.settled_at = Some(SystemTime::now());
        true
    }
}

fn millis_since_epoch(time: &SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn unix_millis<S: serde::Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(millis_since_epoch(time))
}

fn unix_millis_opt<S: serde::Serializer>(
    time: &Option<SystemTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_some(&millis_since_epoch(time)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TransactionRecord {
        TransactionRecord::pending(B256::repeat_byte(0x11), "vote", None)
    }

    #[test]
    fn test_starts_pending() {
        let record = record();
        assert_eq!(record.status(), &TxStatus::Pending);
        assert_eq!(record.checks(), 0);
        assert!(record.settled_at().is_none());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut record = record();
        assert!(record.fail("not eligible"));
        assert!(!record.confirm(ConfirmationResult {
            block_number: Some(1),
            gas_used: 21_000,
            events: vec![],
        }));
        assert!(!record.drop_with("timeout"));

        assert_eq!(record.reason(), Some("not eligible"));
        assert!(record.result().is_none());
    }

    #[test]
    fn test_checks_stop_counting_after_settlement() {
        let mut record = record();
        record.note_check();
        record.note_check();
        assert!(record.drop_with("no receipt"));
        record.note_check();
        assert_eq!(record.checks(), 2);
    }

    #[test]
    fn test_serializes_status_tag() {
        let mut record = record();
        record.drop_with("no receipt within 2000ms");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"]["state"], "dropped");
        assert_eq!(json["status"]["reason"], "no receipt within 2000ms");
        assert!(json["submittedAt"].as_u64().unwrap() > 0);
    }
}
