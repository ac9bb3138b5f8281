//! Transaction relay for a delegated proof-of-stake election contract.
//!
//! State-changing calls are split into `submit` and `await_confirmation` on the
//! [`TransactionManager`]; view calls go through the TTL-cached [`QueryAdapter`].
//! [`ElectionClient`] ties both to one deployed contract.

pub mod abi;
pub mod banner;
pub mod config;
pub mod credential;
pub mod election;
pub mod error;
pub mod ledger;
pub mod query;
pub mod retry;
pub mod server;
pub mod tx;

pub use abi::ContractAbi;
pub use credential::Credential;
pub use election::{ConfirmationSettings, ElectionClient};
pub use error::TxError;
pub use ledger::{AlloyLedger, LedgerRpc};
pub use query::QueryAdapter;
pub use tx::{
    PollInterval, TransactionManager, TransactionRecord, TransactionRequest, TxStatus,
};
