//! Transaction submission and confirmation tracking.

mod manager;
mod record;
mod request;

pub use manager::{ManagerConfig, PollInterval, TransactionManager};
pub use record::{ConfirmationResult, TransactionRecord, TxStatus};
pub use request::{FeeParams, TransactionRequest};
