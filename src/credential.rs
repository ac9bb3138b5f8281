use alloy::{
    network::EthereumWallet,
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use std::fmt;
use std::str::FromStr;

use crate::error::TxError;

/// Opaque signing capability used to authorize transactions.
///
/// The key material never leaves this type: `Debug` only shows the address and
/// there is no accessor for the secret.
#[derive(Clone)]
pub struct Credential {
    wallet: EthereumWallet,
    address: Address,
}

impl Credential {
    /// Load a credential from a hex private key (with or without 0x prefix).
    pub fn from_private_key(private_key: &str) -> Result<Self, TxError> {
        let key = private_key.trim().trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|_| TxError::InvalidRequest("credential is not a valid private key".into()))?;
        Ok(Self::from_signer(signer))
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            wallet: EthereumWallet::from(signer),
            address,
        }
    }

    /// Address transactions signed with this credential are sent from.
    pub fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
