pub mod consts;
mod relay;

pub use relay::{
    load_config_from_path, ConfirmationConfig, LedgerArgs, LedgerConfig, QueryConfig,
    RelayConfig, ServerConfig,
};
