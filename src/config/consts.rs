//! Centralized defaults for the relay server and the admin CLI.
//!
//! Values are conditionally compiled based on the build profile (debug vs release)
//! where a local dev chain benefits from tighter timings.

// =============================================================================
// Ledger
// =============================================================================

/// Default JSON-RPC endpoint (local anvil/hardhat node)
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Default config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

// =============================================================================
// Confirmation Tracking
// =============================================================================

/// How long a confirmation wait lasts before the transaction is marked dropped
#[cfg(debug_assertions)]
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 30_000;

#[cfg(not(debug_assertions))]
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 120_000;

/// First receipt poll happens this long after submission
pub const DEFAULT_POLL_INITIAL_MS: u64 = 250;

/// Receipt polling backs off up to this interval
#[cfg(debug_assertions)]
pub const DEFAULT_POLL_MAX_MS: u64 = 2_000;

#[cfg(not(debug_assertions))]
pub const DEFAULT_POLL_MAX_MS: u64 = 8_000;

pub const DEFAULT_POLL_MULTIPLIER: f64 = 2.0;

/// Floor for any receipt poll delay, including caller-supplied schedules
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Terminal records are kept this long unless acknowledged earlier.
/// Pending records with no waiter are abandoned after the same window.
pub const DEFAULT_RETENTION_SECS: u64 = 15 * 60;

/// Gas estimate buffer, in percent on top of `eth_estimateGas`
pub const GAS_ESTIMATE_BUFFER_PERCENT: u64 = 50;

// =============================================================================
// Read Queries
// =============================================================================

/// Cached read results are served for this long
pub const DEFAULT_QUERY_CACHE_TTL_MS: u64 = 3_000;

// =============================================================================
// RPC Retry Settings
// =============================================================================

/// Maximum attempts for a transient RPC failure before it is surfaced
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 4;

/// Delay before the first retry
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Retry delay cap
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 3_000;

// =============================================================================
// HTTP
// =============================================================================

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Solidity Error(string) function selector
pub const ERROR_STRING_SELECTOR: &str = "08c379a0";
