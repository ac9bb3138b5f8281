use alloy::{
    consensus::Transaction as _,
    eips::BlockId,
    network::{TransactionBuilder, TransactionResponse},
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest as RpcTransactionRequest},
    transports::{RpcError, TransportError},
};
use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use super::{
    revert::{decode_revert_data, revert_reason_from_message},
    EmittedEvent, FeeEstimate, Inclusion, LedgerRpc, RpcFailure,
};

/// Ledger access over an alloy provider (HTTP or WebSocket endpoint).
#[derive(Clone)]
pub struct AlloyLedger {
    provider: DynProvider,
}

impl AlloyLedger {
    /// Connect to the JSON-RPC endpoint at `rpc_url`.
    pub async fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .with_context(|| format!("failed to connect to {rpc_url}"))?
            .erased();
        Ok(Self { provider })
    }

    /// Re-execute a reverted transaction on the state it started from to recover
    /// the revert reason.
    ///
    /// Replays against the parent of the inclusion block. Transactions ordered
    /// before it in the same block are not applied, so the reason is best effort.
    async fn replay_revert_reason(&self, hash: B256, block_number: Option<u64>) -> Option<String> {
        let tx = self.provider.get_transaction_by_hash(hash).await.ok()??;

        let mut replay = RpcTransactionRequest::default()
            .with_from(TransactionResponse::from(&tx))
            .with_input(tx.input().clone())
            .with_value(tx.value())
            .with_gas_limit(tx.gas_limit());
        if let Some(to) = tx.to() {
            replay = replay.with_to(to);
        }

        let call = self.provider.call(replay);
        let result = match block_number.and_then(replay_block) {
            Some(number) => call.block(BlockId::number(number)).await,
            None => call.await,
        };

        match result {
            Ok(_) => None,
            Err(e) => match classify(e) {
                RpcFailure::Rejected { revert_reason, .. } => revert_reason,
                RpcFailure::Transport(message) => {
                    debug!(tx_hash = ?hash, error = %message, "revert replay failed");
                    None
                }
            },
        }
    }
}

/// State before the inclusion block; the genesis block has no parent.
fn replay_block(included_in: u64) -> Option<u64> {
    included_in.checked_sub(1)
}

fn classify(error: TransportError) -> RpcFailure {
    match error {
        RpcError::ErrorResp(payload) => {
            let revert_reason = payload
                .as_revert_data()
                .and_then(|data| decode_revert_data(&data))
                .or_else(|| revert_reason_from_message(&payload.message));
            RpcFailure::Rejected {
                message: payload.message.to_string(),
                revert_reason,
            }
        }
        RpcError::Transport(kind) => RpcFailure::Transport(kind.to_string()),
        other => RpcFailure::rejected(other.to_string()),
    }
}

fn events_of(receipt: &TransactionReceipt) -> Vec<EmittedEvent> {
    receipt
        .inner
        .logs()
        .iter()
        .map(|log| EmittedEvent {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        })
        .collect()
}

#[async_trait]
impl LedgerRpc for AlloyLedger {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        self.provider.get_chain_id().await.map_err(classify)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcFailure> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(classify)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcFailure> {
        let estimate = self.provider.estimate_eip1559_fees().await.map_err(classify)?;
        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, tx: &RpcTransactionRequest) -> Result<u64, RpcFailure> {
        self.provider.estimate_gas(tx.clone()).await.map_err(classify)
    }

    async fn call(&self, tx: &RpcTransactionRequest) -> Result<Bytes, RpcFailure> {
        self.provider.call(tx.clone()).await.map_err(classify)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify)?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Inclusion>, RpcFailure> {
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify)?
        else {
            return Ok(None);
        };

        let success = receipt.status();
        let revert_reason = if success {
            None
        } else {
            self.replay_revert_reason(hash, receipt.block_number).await
        };

        Ok(Some(Inclusion {
            block_number: receipt.block_number,
            success,
            gas_used: receipt.gas_used,
            events: events_of(&receipt),
            revert_reason,
        }))
    }
}
