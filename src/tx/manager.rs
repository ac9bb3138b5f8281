//! # Transaction Manager
//!
//! Splits a state-changing contract call into two explicit phases:
//! - `submit`: validate, simulate, sign locally and broadcast. Returns a Pending record.
//! - `await_confirmation`: poll for the receipt with backoff until the
//!   transaction is included or the mandatory timeout elapses.
//!
//! Every record lives behind its own lock, so concurrent waits on different
//! transactions never touch each other's state. The registry map is only
//! locked to insert, look up or prune.
//!
//! ## Usage
//!
//! ```ignore
//! let record = manager.submit(request).await?;
//! // ... later, or from another task
//! let record = manager
//!     .await_confirmation(record.id(), Duration::from_secs(30), PollInterval::default())
//!     .await?;
//! ```

use alloy::{
    consensus::TxEnvelope,
    eips::eip2718::Encodable2718,
    network::TransactionBuilder,
    primitives::B256,
    rpc::types::TransactionRequest as RpcTransactionRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::consts::{
    DEFAULT_POLL_INITIAL_MS, DEFAULT_POLL_MAX_MS, DEFAULT_POLL_MULTIPLIER,
    DEFAULT_RETENTION_SECS, GAS_ESTIMATE_BUFFER_PERCENT, MIN_POLL_INTERVAL_MS,
};
use crate::error::TxError;
use crate::ledger::{revert::is_already_known, Inclusion, LedgerRpc, RpcFailure};
use crate::retry::{backoff_delay, retry_with_classifier, RetryConfig};

use super::record::{TransactionRecord, TxStatus};
use super::request::TransactionRequest;

/// Receipt polling schedule: starts at `initial`, grows by `multiplier`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollInterval {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_POLL_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_POLL_MAX_MS),
            multiplier: DEFAULT_POLL_MULTIPLIER,
        }
    }
}

impl PollInterval {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            multiplier: 1.0,
        }
    }

    /// Sleep before the poll following the `nth` empty one (1-based).
    ///
    /// Never shorter than `MIN_POLL_INTERVAL_MS`, whatever the schedule says.
    pub fn delay_after(&self, nth: u32) -> Duration {
        backoff_delay(self.initial, self.multiplier, self.max, nth)
            .max(Duration::from_millis(MIN_POLL_INTERVAL_MS))
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Retry policy for transient RPC failures during submission.
    pub retry: RetryConfig,
    /// Terminal records older than this are pruned. Pending records nobody
    /// waits on are abandoned (Dropped) once their submission is this old.
    pub retention: Duration,
    pub gas_buffer_percent: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            gas_buffer_percent: GAS_ESTIMATE_BUFFER_PERCENT,
        }
    }
}

type RecordCell = Arc<Mutex<TransactionRecord>>;

pub struct TransactionManager {
    ledger: Arc<dyn LedgerRpc>,
    config: ManagerConfig,
    chain_id: OnceCell<u64>,
    /// Held from nonce lookup to broadcast so two submissions never share a nonce.
    submit_lock: Mutex<()>,
    records: RwLock<HashMap<B256, RecordCell>>,
}

impl TransactionManager {
    pub fn new(ledger: Arc<dyn LedgerRpc>, config: ManagerConfig) -> Self {
        Self {
            ledger,
            config,
            chain_id: OnceCell::new(),
            submit_lock: Mutex::new(()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Validate, sign and broadcast `request`. The returned record is always Pending.
    pub async fn submit(&self, request: TransactionRequest) -> Result<TransactionRecord, TxError> {
        request.validate()?;
        self.prune_expired().await;

        let method = request.label().to_string();
        let sender = request.sender();
        let chain_id = self.chain_id(&method).await?;

        let tx = RpcTransactionRequest::default()
            .with_from(sender)
            .with_to(request.target())
            .with_input(request.payload().clone())
            .with_value(request.value())
            .with_chain_id(chain_id);

        // Pre-simulate so contract-level rejections surface with their reason
        // before anything is signed.
        self.with_retry("eth_call", || self.ledger.call(&tx))
            .await
            .map_err(|e| submission_error(&method, "eth_call", e))?;

        let fees = request.fees();
        let (max_fee, priority_fee) = match (fees.max_fee_per_gas, fees.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority_fee)) => (max_fee, priority_fee),
            (max_fee, priority_fee) => {
                let estimate = self
                    .with_retry("fee_estimate", || self.ledger.fee_estimate())
                    .await
                    .map_err(|e| submission_error(&method, "fee_estimate", e))?;
                (
                    max_fee.unwrap_or(estimate.max_fee_per_gas),
                    priority_fee.unwrap_or(estimate.max_priority_fee_per_gas),
                )
            }
        };
        // EIP-1559 requires the tip to fit under the fee cap.
        let priority_fee = priority_fee.min(max_fee);

        let gas_limit = match fees.gas_limit {
            Some(limit) => limit,
            None => {
                let estimated = self
                    .with_retry("eth_estimateGas", || self.ledger.estimate_gas(&tx))
                    .await
                    .map_err(|e| submission_error(&method, "eth_estimateGas", e))?;
                estimated.saturating_add(estimated.saturating_mul(self.config.gas_buffer_percent) / 100)
            }
        };

        let guard = self.submit_lock.lock().await;

        let nonce = self
            .with_retry("eth_getTransactionCount", || self.ledger.pending_nonce(sender))
            .await
            .map_err(|e| submission_error(&method, "eth_getTransactionCount", e))?;

        let envelope: TxEnvelope = tx
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(max_fee)
            .with_max_priority_fee_per_gas(priority_fee)
            .build(request.credential().wallet())
            .await
            .map_err(|e| TxError::InvalidRequest(format!("cannot sign {method}: {e}")))?;
        let local_hash = *envelope.tx_hash();
        let raw = envelope.encoded_2718();

        let id = match self
            .with_retry("eth_sendRawTransaction", || {
                self.ledger.send_raw_transaction(&raw)
            })
            .await
        {
            Ok(assigned) => {
                if assigned != local_hash {
                    warn!(
                        method = %method,
                        local_hash = ?local_hash,
                        node_hash = ?assigned,
                        "Node reported a different transaction hash"
                    );
                }
                assigned
            }
            // A retried broadcast that already reached the node
            Err(RpcFailure::Rejected { message, .. }) if is_already_known(&message) => {
                debug!(method = %method, tx_hash = ?local_hash, "Node already knows transaction");
                local_hash
            }
            Err(e) => return Err(submission_error(&method, "eth_sendRawTransaction", e)),
        };
        drop(guard);

        let record = TransactionRecord::pending(id, method.clone(), Some(sender));
        self.records
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record.clone())));

        info!(
            method = %method,
            tx_hash = ?id,
            sender = %sender,
            nonce,
            gas_limit,
            max_fee,
            priority_fee,
            "📤 transaction submitted"
        );
        Ok(record)
    }

    /// Poll until `id` settles or `timeout` elapses.
    ///
    /// Returns the Confirmed record; a revert yields `RevertedOnChain`, a timeout
    /// marks the record Dropped and yields `ConfirmationTimeout`. Calling it on an
    /// already settled record returns the stored outcome without polling.
    ///
    /// If the node never answered a single receipt lookup before the deadline,
    /// nothing is known about inclusion: the record stays Pending and the call
    /// yields `TransientNetworkError`.
    pub async fn await_confirmation(
        &self,
        id: B256,
        timeout: Duration,
        poll: PollInterval,
    ) -> Result<TransactionRecord, TxError> {
        self.await_confirmation_with_cancel(id, timeout, poll, &CancellationToken::new())
            .await
    }

    /// Same as [`await_confirmation`](Self::await_confirmation), stoppable through `cancel`.
    ///
    /// Cancelling only ends the local wait: the record stays Pending and the
    /// broadcast transaction may still be included.
    pub async fn await_confirmation_with_cancel(
        &self,
        id: B256,
        timeout: Duration,
        poll: PollInterval,
        cancel: &CancellationToken,
    ) -> Result<TransactionRecord, TxError> {
        let cell = self.cell(id).await?;
        {
            let record = cell.lock().await;
            if record.is_terminal() {
                return settled_outcome(&record);
            }
        }

        let started = Instant::now();
        let deadline = started + timeout;
        let mut empty_polls = 0u32;
        let mut answered = false;
        let mut last_failure: Option<RpcFailure> = None;

        loop {
            let lookup = self.ledger.transaction_receipt(id).await;

            {
                let mut record = cell.lock().await;
                // Another waiter may have settled it while we were polling.
                if record.is_terminal() {
                    return settled_outcome(&record);
                }
                record.note_check();

                match lookup {
                    Ok(Some(inclusion)) => return settle_included(&mut record, inclusion),
                    Ok(None) => {
                        answered = true;
                        last_failure = None;
                    }
                    Err(e) => {
                        warn!(tx_hash = ?id, error = %e, "Receipt lookup failed, will poll again");
                        last_failure = Some(e);
                    }
                }

                let now = Instant::now();
                if now >= deadline {
                    if !answered {
                        let message = last_failure
                            .map(|e| e.describe())
                            .unwrap_or_else(|| "no answer".to_string());
                        warn!(
                            tx_hash = ?id,
                            checks = record.checks(),
                            error = %message,
                            "Every receipt lookup failed, leaving transaction pending"
                        );
                        return Err(TxError::TransientNetworkError {
                            operation: "eth_getTransactionReceipt".into(),
                            message,
                        });
                    }

                    let mut reason = format!("no receipt within {}ms", timeout.as_millis());
                    if let Some(e) = last_failure {
                        reason.push_str(&format!("; last lookup failed: {}", e.describe()));
                    }
                    record.drop_with(reason);
                    warn!(
                        tx_hash = ?id,
                        method = %record.label(),
                        checks = record.checks(),
                        "⌛ confirmation timed out, transaction dropped locally"
                    );
                    return Err(TxError::ConfirmationTimeout {
                        id,
                        waited: now - started,
                    });
                }
            }

            empty_polls += 1;
            let delay = poll
                .delay_after(empty_polls)
                .min(deadline.saturating_duration_since(Instant::now()));

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(tx_hash = ?id, "Confirmation wait cancelled");
                    return Err(TxError::Cancelled(id));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Submit and wait for settlement in one call.
    pub async fn submit_and_confirm(
        &self,
        request: TransactionRequest,
        timeout: Duration,
        poll: PollInterval,
    ) -> Result<TransactionRecord, TxError> {
        let record = self.submit(request).await?;
        self.await_confirmation(record.id(), timeout, poll).await
    }

    /// Non-blocking lookup of a tracked transaction.
    pub async fn get_status(&self, id: B256) -> Result<TransactionRecord, TxError> {
        let cell = self.cell(id).await?;
        let record = cell.lock().await;
        Ok(record.clone())
    }

    /// Start tracking a transaction broadcast elsewhere.
    pub async fn track(&self, id: B256, label: &str) -> TransactionRecord {
        let mut records = self.records.write().await;
        let cell = records
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(TransactionRecord::pending(id, label, None))))
            .clone();
        drop(records);

        let record = cell.lock().await;
        record.clone()
    }

    /// Caller is done with a settled record; forget it.
    pub async fn acknowledge(&self, id: B256) -> Result<TransactionRecord, TxError> {
        let cell = self.cell(id).await?;
        let record = cell.lock().await.clone();
        if !record.is_terminal() {
            return Err(TxError::StillPending(id));
        }
        self.records.write().await.remove(&id);
        Ok(record)
    }

    /// One-shot receipt lookup that never touches the local record.
    pub async fn check_onchain(&self, id: B256) -> Result<Option<Inclusion>, TxError> {
        self.with_retry("eth_getTransactionReceipt", || {
            self.ledger.transaction_receipt(id)
        })
        .await
        .map_err(|e| match e {
            RpcFailure::Transport(message) => TxError::TransientNetworkError {
                operation: "eth_getTransactionReceipt".into(),
                message,
            },
            rejected => TxError::QueryFailed {
                method: "eth_getTransactionReceipt".into(),
                reason: rejected.describe(),
            },
        })
    }

    /// Forget records older than the retention window. Returns how many were removed.
    ///
    /// Settled records expire `retention` after settling. Pending records expire
    /// `retention` after submission when no confirmation wait is running on
    /// them; they are marked Dropped before removal.
    pub async fn prune_expired(&self) -> usize {
        let now = SystemTime::now();
        let retention = self.config.retention;
        let expired = |since: SystemTime| {
            now.duration_since(since)
                .map(|age| age >= retention)
                .unwrap_or(false)
        };
        let mut records = self.records.write().await;
        let before = records.len();

        records.retain(|id, cell| {
            // The map holds one handle; any other belongs to a caller still using the record.
            if Arc::strong_count(cell) > 1 {
                return true;
            }
            let Ok(mut record) = cell.try_lock() else {
                return true;
            };
            match record.settled_at() {
                Some(settled) => !expired(settled),
                None if expired(record.submitted_at()) => {
                    record.drop_with(ABANDONED_REASON);
                    warn!(
                        tx_hash = ?id,
                        method = %record.label(),
                        checks = record.checks(),
                        "Abandoned pending transaction with no waiter"
                    );
                    false
                }
                None => true,
            }
        });

        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, "Pruned expired transaction records");
        }
        pruned
    }

    pub async fn tracked(&self) -> usize {
        self.records.read().await.len()
    }

    async fn cell(&self, id: B256) -> Result<RecordCell, TxError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TxError::NotFound(id))
    }

    async fn chain_id(&self, method: &str) -> Result<u64, TxError> {
        self.chain_id
            .get_or_try_init(|| async {
                self.with_retry("eth_chainId", || self.ledger.chain_id())
                    .await
                    .map_err(|e| submission_error(method, "eth_chainId", e))
            })
            .await
            .copied()
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, RpcFailure>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcFailure>>,
    {
        retry_with_classifier(&self.config.retry, operation, call, RpcFailure::is_transient).await
    }
}

const ABANDONED_REASON: &str = "abandoned: no waiter within retention";

fn submission_error(method: &str, operation: &str, failure: RpcFailure) -> TxError {
    match failure {
        RpcFailure::Transport(message) => TxError::TransientNetworkError {
            operation: operation.to_string(),
            message,
        },
        rejected => TxError::SubmissionFailed {
            method: method.to_string(),
            reason: rejected.describe(),
        },
    }
}

fn settle_included(
    record: &mut TransactionRecord,
    inclusion: Inclusion,
) -> Result<TransactionRecord, TxError> {
    let id = record.id();
    if inclusion.success {
        let block_number = inclusion.block_number;
        let gas_used = inclusion.gas_used;
        record.confirm(inclusion.into());
        info!(
            tx_hash = ?id,
            method = %record.label(),
            block_number = ?block_number,
            gas_used,
            checks = record.checks(),
            "✅ transaction confirmed"
        );
        return Ok(record.clone());
    }

    let reason = inclusion
        .revert_reason
        .unwrap_or_else(|| "execution reverted without a reason".to_string());
    record.fail(reason.clone());
    warn!(
        tx_hash = ?id,
        method = %record.label(),
        reason = %reason,
        "❌ transaction reverted on-chain"
    );
    Err(TxError::RevertedOnChain { id, reason })
}

fn settled_outcome(record: &TransactionRecord) -> Result<TransactionRecord, TxError> {
    let id = record.id();
    match record.status() {
        TxStatus::Confirmed => Ok(record.clone()),
        TxStatus::Failed { reason } => Err(TxError::RevertedOnChain {
            id,
            reason: reason.clone(),
        }),
        TxStatus::Dropped { .. } => Err(TxError::ConfirmationTimeout {
            id,
            waited: record
                .settled_at()
                .and_then(|settled| settled.duration_since(record.submitted_at()).ok())
                .unwrap_or_default(),
        }),
        TxStatus::Pending => Err(TxError::StillPending(id)),
    }
}
