//! In-memory ledger for tests: every broadcast follows a script that decides
//! if and when a receipt shows up.

use alloy::{
    consensus::{Transaction as _, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{keccak256, Address, Bytes, B256},
    rpc::types::TransactionRequest as RpcTransactionRequest,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{EmittedEvent, FeeEstimate, Inclusion, LedgerRpc, RpcFailure};

pub(crate) const CHAIN_ID: u64 = 31337;

#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// A receipt appears `after` the broadcast.
    Include {
        after: Duration,
        success: bool,
        revert_reason: Option<String>,
        events: Vec<EmittedEvent>,
    },
    /// The transaction is never included.
    Never,
}

impl Script {
    pub(crate) fn succeed_after(after: Duration) -> Self {
        Script::Include {
            after,
            success: true,
            revert_reason: None,
            events: vec![],
        }
    }

    pub(crate) fn succeed_with_events(after: Duration, events: Vec<EmittedEvent>) -> Self {
        Script::Include {
            after,
            success: true,
            revert_reason: None,
            events,
        }
    }

    pub(crate) fn revert_after(after: Duration, reason: &str) -> Self {
        Script::Include {
            after,
            success: false,
            revert_reason: Some(reason.to_string()),
            events: vec![],
        }
    }
}

struct Broadcast {
    sent_at: Instant,
    script: Script,
}

/// Signed fields of a broadcast envelope, as the node decoded them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SentTx {
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: Option<u128>,
}

struct State {
    next_nonce: u64,
    default_script: Script,
    queued: VecDeque<Script>,
    sent: HashMap<B256, Broadcast>,
    sent_txs: Vec<SentTx>,
    fee_estimate: FeeEstimate,
    fee_estimates: u32,
    gas_estimates: u32,
    transient_failures: u32,
    send_rejection: Option<String>,
    already_known_once: bool,
    simulation_revert: Option<String>,
    call_failure: Option<String>,
    call_responses: HashMap<Bytes, Bytes>,
    receipt_polls: HashMap<B256, u32>,
    eth_calls: u32,
}

pub(crate) struct ScriptedLedger {
    state: Mutex<State>,
}

impl ScriptedLedger {
    pub(crate) fn new(default_script: Script) -> Self {
        Self {
            state: Mutex::new(State {
                next_nonce: 0,
                default_script,
                queued: VecDeque::new(),
                sent: HashMap::new(),
                sent_txs: Vec::new(),
                fee_estimate: FeeEstimate {
                    max_fee_per_gas: 2_000_000_000,
                    max_priority_fee_per_gas: 1_000_000_000,
                },
                fee_estimates: 0,
                gas_estimates: 0,
                transient_failures: 0,
                send_rejection: None,
                already_known_once: false,
                simulation_revert: None,
                call_failure: None,
                call_responses: HashMap::new(),
                receipt_polls: HashMap::new(),
                eth_calls: 0,
            }),
        }
    }

    /// Script for the next broadcast; falls back to the default once the queue is empty.
    pub(crate) fn push_script(&self, script: Script) {
        self.state.lock().unwrap().queued.push_back(script);
    }

    /// The next `count` RPC calls of any kind fail at the transport level.
    pub(crate) fn fail_next_calls(&self, count: u32) {
        self.state.lock().unwrap().transient_failures = count;
    }

    pub(crate) fn reject_sends(&self, message: &str) {
        self.state.lock().unwrap().send_rejection = Some(message.to_string());
    }

    /// Accept the next broadcast but answer as if the node had already seen it.
    pub(crate) fn report_already_known(&self) {
        self.state.lock().unwrap().already_known_once = true;
    }

    /// `eth_call` without a canned response reverts with `reason`.
    pub(crate) fn revert_simulation(&self, reason: &str) {
        self.state.lock().unwrap().simulation_revert = Some(reason.to_string());
    }

    pub(crate) fn fail_calls(&self, message: &str) {
        self.state.lock().unwrap().call_failure = Some(message.to_string());
    }

    pub(crate) fn respond_to_call(&self, calldata: Bytes, output: Bytes) {
        self.state
            .lock()
            .unwrap()
            .call_responses
            .insert(calldata, output);
    }

    pub(crate) fn receipt_polls(&self, hash: B256) -> u32 {
        self.state
            .lock()
            .unwrap()
            .receipt_polls
            .get(&hash)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn eth_calls(&self) -> u32 {
        self.state.lock().unwrap().eth_calls
    }

    pub(crate) fn broadcasts(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub(crate) fn sent_nonces(&self) -> Vec<u64> {
        self.sent_txs().iter().map(|tx| tx.nonce).collect()
    }

    pub(crate) fn sent_txs(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent_txs.clone()
    }

    pub(crate) fn set_fee_estimate(&self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) {
        self.state.lock().unwrap().fee_estimate = FeeEstimate {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        };
    }

    /// Number of `fee_estimate` and `eth_estimateGas` calls answered so far.
    pub(crate) fn estimates(&self) -> (u32, u32) {
        let state = self.state.lock().unwrap();
        (state.fee_estimates, state.gas_estimates)
    }

    fn transport_check(state: &mut State) -> Result<(), RpcFailure> {
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(RpcFailure::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRpc for ScriptedLedger {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        Ok(CHAIN_ID)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        Ok(state.next_nonce)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        state.fee_estimates += 1;
        Ok(state.fee_estimate)
    }

    async fn estimate_gas(&self, _tx: &RpcTransactionRequest) -> Result<u64, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        state.gas_estimates += 1;
        Ok(50_000)
    }

    async fn call(&self, tx: &RpcTransactionRequest) -> Result<Bytes, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        state.eth_calls += 1;

        if let Some(message) = &state.call_failure {
            return Err(RpcFailure::rejected(message.clone()));
        }
        let calldata = tx.input.input().cloned().unwrap_or_default();
        if let Some(output) = state.call_responses.get(&calldata) {
            return Ok(output.clone());
        }
        match &state.simulation_revert {
            Some(reason) => Err(RpcFailure::Rejected {
                message: "execution reverted".into(),
                revert_reason: Some(reason.clone()),
            }),
            None => Ok(Bytes::new()),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;

        if let Some(message) = &state.send_rejection {
            return Err(RpcFailure::rejected(message.clone()));
        }

        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| RpcFailure::rejected(format!("rlp: {e}")))?;
        let hash = keccak256(raw);
        let script = match state.queued.pop_front() {
            Some(script) => script,
            None => state.default_script.clone(),
        };

        state.sent_txs.push(SentTx {
            nonce: envelope.nonce(),
            gas_limit: envelope.gas_limit(),
            max_fee_per_gas: envelope.max_fee_per_gas(),
            max_priority_fee_per_gas: envelope.max_priority_fee_per_gas(),
        });
        state.next_nonce = envelope.nonce() + 1;
        state.sent.insert(
            hash,
            Broadcast {
                sent_at: Instant::now(),
                script,
            },
        );
        if std::mem::take(&mut state.already_known_once) {
            return Err(RpcFailure::rejected("already known"));
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Inclusion>, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        Self::transport_check(&mut state)?;
        *state.receipt_polls.entry(hash).or_default() += 1;

        let Some(broadcast) = state.sent.get(&hash) else {
            return Ok(None);
        };
        match &broadcast.script {
            Script::Include {
                after,
                success,
                revert_reason,
                events,
            } if broadcast.sent_at.elapsed() >= *after => Ok(Some(Inclusion {
                block_number: Some(1),
                success: *success,
                gas_used: 42_000,
                events: events.clone(),
                revert_reason: revert_reason.clone(),
            })),
            _ => Ok(None),
        }
    }
}
