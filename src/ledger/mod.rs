//! The JSON-RPC seam between the relay and the ledger node.
//!
//! `LedgerRpc` mirrors the handful of node methods the transaction manager and
//! the query adapter need. The production implementation is [`AlloyLedger`];
//! everything above this module only sees the trait.

use alloy::{
    primitives::{Address, Bytes, B256},
    rpc::types::TransactionRequest as RpcTransactionRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod alloy_rpc;
pub mod revert;

#[cfg(test)]
pub(crate) mod scripted;

pub use alloy_rpc::AlloyLedger;

/// Why a single RPC call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// The node could not be reached or the connection broke mid-call.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an error (bad nonce, funds, revert, ...).
    #[error("{message}")]
    Rejected {
        message: String,
        /// Decoded revert reason, when the error carried revert data.
        revert_reason: Option<String>,
    },
}

impl RpcFailure {
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcFailure::Transport(_))
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        RpcFailure::Rejected {
            message: message.into(),
            revert_reason: None,
        }
    }

    /// Human-readable explanation, preferring a decoded revert reason.
    pub fn describe(&self) -> String {
        match self {
            RpcFailure::Transport(message) => message.clone(),
            RpcFailure::Rejected {
                revert_reason: Some(reason),
                ..
            } => format!("reverted: {reason}"),
            RpcFailure::Rejected { message, .. } => revert::explain_node_error(message),
        }
    }
}

/// Current EIP-1559 fee suggestion from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// A log emitted by an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Outcome of a transaction once the ledger has included it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub block_number: Option<u64>,
    pub success: bool,
    pub gas_used: u64,
    pub events: Vec<EmittedEvent>,
    /// Revert reason for a failed inclusion, if the node could recover one.
    pub revert_reason: Option<String>,
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64, RpcFailure>;

    /// `eth_getTransactionCount(address, "pending")`
    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcFailure>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcFailure>;

    /// `eth_estimateGas`
    async fn estimate_gas(&self, tx: &RpcTransactionRequest) -> Result<u64, RpcFailure>;

    /// `eth_call` against the latest block.
    async fn call(&self, tx: &RpcTransactionRequest) -> Result<Bytes, RpcFailure>;

    /// `eth_sendRawTransaction`; returns the hash the node assigned.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is not included.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Inclusion>, RpcFailure>;
}
