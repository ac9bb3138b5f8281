//! Client context for the DPoS election contract.
//!
//! Holds the ledger connection, the contract ABI and address explicitly instead
//! of process-wide singletons. Writes go through the [`TransactionManager`],
//! reads through the cached [`QueryAdapter`].

use alloy::{dyn_abi::DynSolValue, primitives::Address};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::abi::ContractAbi;
use crate::config::RelayConfig;
use crate::credential::Credential;
use crate::error::TxError;
use crate::ledger::LedgerRpc;
use crate::query::QueryAdapter;
use crate::tx::{PollInterval, TransactionManager, TransactionRecord, TransactionRequest};

/// How long state-changing calls wait for inclusion, and how often they poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationSettings {
    pub timeout: Duration,
    pub poll: PollInterval,
}

pub struct ElectionClient {
    manager: Arc<TransactionManager>,
    queries: QueryAdapter,
    abi: ContractAbi,
    contract: Address,
    confirmation: ConfirmationSettings,
}

impl ElectionClient {
    pub fn new(
        manager: Arc<TransactionManager>,
        queries: QueryAdapter,
        abi: ContractAbi,
        contract: Address,
        confirmation: ConfirmationSettings,
    ) -> Self {
        Self {
            manager,
            queries,
            abi,
            contract,
            confirmation,
        }
    }

    /// Wire a client from configuration over an already connected ledger.
    pub fn from_config(config: &RelayConfig, ledger: Arc<dyn LedgerRpc>) -> anyhow::Result<Self> {
        let abi = config.abi()?;
        let contract = config.contract_address()?;
        let manager = Arc::new(TransactionManager::new(
            ledger.clone(),
            config.manager_config(),
        ));
        let queries = QueryAdapter::new(
            ledger,
            abi.clone(),
            contract,
            config.query_ttl(),
            config.retry.clone(),
        );
        Ok(Self::new(
            manager,
            queries,
            abi,
            contract,
            config.confirmation_settings(),
        ))
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn confirmation(&self) -> ConfirmationSettings {
        self.confirmation
    }

    pub async fn election_active(&self) -> Result<bool, TxError> {
        self.queries.query_bool("electionActive").await
    }

    pub async fn winner(&self) -> Result<Address, TxError> {
        self.queries.query_address("getWinner").await
    }

    pub async fn start_election(&self, admin: Credential) -> Result<TransactionRecord, TxError> {
        self.transact("startElection", &[], admin).await
    }

    pub async fn end_election(&self, admin: Credential) -> Result<TransactionRecord, TxError> {
        self.transact("endElection", &[], admin).await
    }

    /// Cast `voter`'s vote for `candidate`. The credential must belong to `voter`.
    pub async fn cast_vote(
        &self,
        voter: Address,
        candidate: Address,
        credential: Credential,
    ) -> Result<TransactionRecord, TxError> {
        if credential.address() != voter {
            return Err(TxError::InvalidRequest(format!(
                "credential belongs to {}, not to voter {voter}",
                credential.address()
            )));
        }
        if candidate == Address::ZERO {
            return Err(TxError::InvalidRequest("candidate address is empty".into()));
        }
        self.transact("vote", &[DynSolValue::Address(candidate)], credential)
            .await
    }

    /// Submit `method` and wait for it to settle.
    ///
    /// Only Confirmed outcomes invalidate the read cache.
    async fn transact(
        &self,
        method: &str,
        args: &[DynSolValue],
        credential: Credential,
    ) -> Result<TransactionRecord, TxError> {
        let request =
            TransactionRequest::contract_call(&self.abi, self.contract, method, args, credential)?;
        let record = self
            .manager
            .submit_and_confirm(request, self.confirmation.timeout, self.confirmation.poll)
            .await?;

        self.queries.invalidate().await;
        info!(
            method,
            tx_hash = ?record.id(),
            contract = %self.contract,
            "Election state changed"
        );
        Ok(record)
    }
}
