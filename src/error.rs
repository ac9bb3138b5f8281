//! Error taxonomy for transaction submission, confirmation and contract reads.

use alloy::primitives::B256;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the transaction manager and the query adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Malformed input. Fails fast and is never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The node rejected the transaction synchronously. Not retried automatically.
    #[error("{method} submission failed: {reason}")]
    SubmissionFailed { method: String, reason: String },

    /// The local wait gave up. The transaction may still confirm later.
    #[error("no receipt for {id:?} after {}ms", waited.as_millis())]
    ConfirmationTimeout { id: B256, waited: Duration },

    /// Included on chain but the contract rejected it.
    #[error("transaction {id:?} reverted on-chain: {reason}")]
    RevertedOnChain { id: B256, reason: String },

    /// The node could not be reached, even after retrying.
    #[error("ledger unreachable during {operation}: {message}")]
    TransientNetworkError { operation: String, message: String },

    #[error("unknown transaction {0:?}")]
    NotFound(B256),

    #[error("query {method} failed: {reason}")]
    QueryFailed { method: String, reason: String },

    /// The caller stopped waiting. The broadcast transaction is not retracted.
    #[error("wait for {0:?} cancelled")]
    Cancelled(B256),

    #[error("transaction {0:?} is still pending")]
    StillPending(B256),
}

impl TxError {
    /// Id of the transaction this error refers to, when there is one.
    pub fn transaction_id(&self) -> Option<B256> {
        match self {
            TxError::ConfirmationTimeout { id, .. } | TxError::RevertedOnChain { id, .. } => {
                Some(*id)
            }
            TxError::NotFound(id) | TxError::Cancelled(id) | TxError::StillPending(id) => {
                Some(*id)
            }
            _ => None,
        }
    }
}
