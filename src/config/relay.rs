use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};
use tracing::info;

use crate::abi::{ContractAbi, ELECTION_METHODS};
use crate::config::consts::{
    DEFAULT_CONFIG_PATH, DEFAULT_CONFIRMATION_TIMEOUT_MS, DEFAULT_LISTEN_ADDR,
    DEFAULT_POLL_INITIAL_MS, DEFAULT_POLL_MAX_MS, DEFAULT_POLL_MULTIPLIER,
    DEFAULT_QUERY_CACHE_TTL_MS, DEFAULT_RETENTION_SECS, DEFAULT_RPC_URL,
    GAS_ESTIMATE_BUFFER_PERCENT,
};
use crate::election::ConfirmationSettings;
use crate::retry::RetryConfig;
use crate::tx::{ManagerConfig, PollInterval};

/// Connection flags shared by every binary. Anything set here wins over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct LedgerArgs {
    /// Path to the TOML config file
    #[arg(long = "config", env = "CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Ledger JSON-RPC endpoint (http(s) or ws(s))
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Deployed DPoS election contract address
    #[arg(long, env = "CONTRACT_ADDRESS")]
    pub contract_address: Option<Address>,

    /// ABI artifact to use instead of the bundled DPoS ABI
    #[arg(long, env = "ABI_PATH")]
    pub abi_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: Option<Address>,
    pub abi_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address: None,
            abi_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_ms: u64,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    pub poll_multiplier: f64,
    /// How long settled records stay queryable.
    pub retention_secs: u64,
    pub gas_buffer_percent: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            poll_initial_ms: DEFAULT_POLL_INITIAL_MS,
            poll_max_ms: DEFAULT_POLL_MAX_MS,
            poll_multiplier: DEFAULT_POLL_MULTIPLIER,
            retention_secs: DEFAULT_RETENTION_SECS,
            gas_buffer_percent: GAS_ESTIMATE_BUFFER_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub cache_ttl_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_QUERY_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

/// Full relay configuration. Every section and field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub ledger: LedgerConfig,
    pub confirmation: ConfirmationConfig,
    pub query: QueryConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

/// Load configuration from a TOML file.
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg: RelayConfig =
        toml::from_str(&s).with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(cfg)
}

impl RelayConfig {
    /// Load configuration with priority: CLI/env -> config file -> defaults.
    ///
    /// An explicitly given config path must exist; the default `relay.toml` is optional.
    pub fn load(args: &LedgerArgs) -> Result<Self> {
        let mut config = match &args.config_path {
            Some(path) => load_config_from_path(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                load_config_from_path(DEFAULT_CONFIG_PATH)?
            }
            None => RelayConfig::default(),
        };
        config.apply_overrides(args);
        config.validate()?;

        info!(
            rpc_url = %config.ledger.rpc_url,
            contract = ?config.ledger.contract_address,
            timeout_ms = config.confirmation.timeout_ms,
            "Loaded RelayConfig"
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &LedgerArgs) {
        if let Some(rpc_url) = &args.rpc_url {
            self.ledger.rpc_url = rpc_url.clone();
        }
        if let Some(address) = args.contract_address {
            self.ledger.contract_address = Some(address);
        }
        if let Some(path) = &args.abi_path {
            self.ledger.abi_path = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.confirmation;
        if c.timeout_ms == 0 {
            anyhow::bail!("confirmation.timeout_ms must be positive");
        }
        if c.poll_initial_ms == 0 {
            anyhow::bail!("confirmation.poll_initial_ms must be positive");
        }
        if c.poll_max_ms < c.poll_initial_ms {
            anyhow::bail!(
                "confirmation.poll_max_ms ({}) is below poll_initial_ms ({})",
                c.poll_max_ms,
                c.poll_initial_ms
            );
        }
        if c.poll_multiplier.is_nan() || c.poll_multiplier < 1.0 {
            anyhow::bail!("confirmation.poll_multiplier must be at least 1.0");
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.ledger
            .contract_address
            .context("contract address not configured (set CONTRACT_ADDRESS or [ledger].contract_address)")
    }

    /// The configured ABI artifact, or the bundled DPoS ABI.
    pub fn abi(&self) -> Result<ContractAbi> {
        let Some(path) = &self.ledger.abi_path else {
            return Ok(ContractAbi::dpos());
        };
        let abi = ContractAbi::load(path)?;
        let missing = abi.missing_functions(&ELECTION_METHODS);
        if !missing.is_empty() {
            anyhow::bail!(
                "ABI {} lacks election functions: {}",
                path.display(),
                missing.join(", ")
            );
        }
        Ok(abi)
    }

    pub fn poll_interval(&self) -> PollInterval {
        PollInterval {
            initial: Duration::from_millis(self.confirmation.poll_initial_ms),
            max: Duration::from_millis(self.confirmation.poll_max_ms),
            multiplier: self.confirmation.poll_multiplier,
        }
    }

    pub fn confirmation_settings(&self) -> ConfirmationSettings {
        ConfirmationSettings {
            timeout: Duration::from_millis(self.confirmation.timeout_ms),
            poll: self.poll_interval(),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            retry: self.retry.clone(),
            retention: Duration::from_secs(self.confirmation.retention_secs),
            gas_buffer_percent: self.confirmation.gas_buffer_percent,
        }
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_millis(self.query.cache_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.ledger.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.server.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.query_ttl(), Duration::from_millis(DEFAULT_QUERY_CACHE_TTL_MS));
        assert!(config.contract_address().is_err());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [ledger]
            contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

            [confirmation]
            timeout_ms = 2000

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(
            config.contract_address().unwrap(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse::<Address>().unwrap()
        );
        assert_eq!(config.confirmation_settings().timeout, Duration::from_secs(2));
        assert_eq!(config.confirmation.poll_initial_ms, DEFAULT_POLL_INITIAL_MS);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.delay_ms, RetryConfig::default().delay_ms);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = RelayConfig::default();
        config.apply_overrides(&LedgerArgs {
            rpc_url: Some("http://10.0.0.5:8545".into()),
            contract_address: Some(Address::repeat_byte(0x11)),
            ..LedgerArgs::default()
        });

        assert_eq!(config.ledger.rpc_url, "http://10.0.0.5:8545");
        assert_eq!(config.contract_address().unwrap(), Address::repeat_byte(0x11));
        assert!(config.ledger.abi_path.is_none());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = RelayConfig::default();
        config.confirmation.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.confirmation.poll_max_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_abi_path_must_cover_election_methods() {
        let path = std::env::temp_dir().join("dpos_relay_partial_abi_test.json");
        fs::write(
            &path,
            r#"[{"type":"function","name":"getWinner","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}]"#,
        )
        .unwrap();

        let mut config = RelayConfig::default();
        config.ledger.abi_path = Some(path.clone());
        let err = config.abi().unwrap_err().to_string();
        assert!(err.contains("electionActive, startElection, endElection, vote"), "{err}");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_from_path() {
        let path = std::env::temp_dir().join("dpos_relay_config_test.toml");
        fs::write(&path, "[server]\nlisten_addr = \"0.0.0.0:8080\"\n").unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");

        fs::remove_file(&path).unwrap();
        assert!(load_config_from_path(&path).is_err());
    }
}
