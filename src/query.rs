//! Read-only contract calls with a short-lived cache.
//!
//! Values are cached by calldata for `ttl`. Expired entries are refetched on
//! the next read, so callers never see a value older than the TTL.

use alloy::{
    dyn_abi::DynSolValue,
    network::TransactionBuilder,
    primitives::{Address, Bytes},
    rpc::types::TransactionRequest as RpcTransactionRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::abi::ContractAbi;
use crate::error::TxError;
use crate::ledger::{LedgerRpc, RpcFailure};
use crate::retry::{retry_with_classifier, RetryConfig};

struct CachedValue {
    values: Vec<DynSolValue>,
    fetched_at: Instant,
}

pub struct QueryAdapter {
    ledger: Arc<dyn LedgerRpc>,
    abi: ContractAbi,
    target: Address,
    ttl: Duration,
    retry: RetryConfig,
    cache: Mutex<HashMap<Bytes, CachedValue>>,
}

impl QueryAdapter {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        abi: ContractAbi,
        target: Address,
        ttl: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            ledger,
            abi,
            target,
            ttl,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Call a view method and decode its outputs.
    pub async fn query(
        &self,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, TxError> {
        let calldata = self.abi.encode_call(method, args)?;

        if let Some(cached) = self.cache.lock().await.get(&calldata) {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!(method, "Query served from cache");
                return Ok(cached.values.clone());
            }
        }

        let tx = RpcTransactionRequest::default()
            .with_to(self.target)
            .with_input(calldata.clone());
        let output = retry_with_classifier(
            &self.retry,
            method,
            || self.ledger.call(&tx),
            RpcFailure::is_transient,
        )
        .await
        .map_err(|e| match e {
            RpcFailure::Transport(message) => TxError::TransientNetworkError {
                operation: format!("eth_call {method}"),
                message,
            },
            rejected => TxError::QueryFailed {
                method: method.to_string(),
                reason: rejected.describe(),
            },
        })?;

        let values = self.abi.decode_output(method, &output)?;
        if !self.ttl.is_zero() {
            self.cache.lock().await.insert(
                calldata,
                CachedValue {
                    values: values.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(values)
    }

    pub async fn query_bool(&self, method: &str) -> Result<bool, TxError> {
        match self.query(method, &[]).await?.first() {
            Some(DynSolValue::Bool(value)) => Ok(*value),
            other => Err(unexpected_output(method, "bool", other)),
        }
    }

    pub async fn query_address(&self, method: &str) -> Result<Address, TxError> {
        match self.query(method, &[]).await?.first() {
            Some(DynSolValue::Address(value)) => Ok(*value),
            other => Err(unexpected_output(method, "address", other)),
        }
    }

    /// Forget every cached value. Called after a state-changing transaction confirms.
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
    }
}

fn unexpected_output(method: &str, expected: &str, got: Option<&DynSolValue>) -> TxError {
    TxError::QueryFailed {
        method: method.to_string(),
        reason: format!("expected {expected} output, got {got:?}"),
    }
}
