use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, U256},
};

use crate::{abi::ContractAbi, credential::Credential, error::TxError};

/// Optional fee overrides. Anything left unset is filled from the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeParams {
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A state-changing contract call, ready to be signed and submitted.
///
/// Immutable once built: the `with_*` methods consume the request and return a new one.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    target: Address,
    payload: Bytes,
    credential: Credential,
    fees: FeeParams,
    value: U256,
    label: String,
}

impl TransactionRequest {
    pub fn new(target: Address, payload: Bytes, credential: Credential) -> Self {
        let label = match payload.get(..4) {
            Some(selector) => format!("0x{}", hex::encode(selector)),
            None => "call".to_string(),
        };
        Self {
            target,
            payload,
            credential,
            fees: FeeParams::default(),
            value: U256::ZERO,
            label,
        }
    }

    /// Build a request calling `method` on `target`, encoded through `abi`.
    pub fn contract_call(
        abi: &ContractAbi,
        target: Address,
        method: &str,
        args: &[DynSolValue],
        credential: Credential,
    ) -> Result<Self, TxError> {
        let payload = abi.encode_call(method, args)?;
        Ok(Self::new(target, payload, credential).with_label(method))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.fees.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.fees.max_fee_per_gas = Some(max_fee_per_gas);
        self.fees.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn fees(&self) -> FeeParams {
        self.fees
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sender(&self) -> Address {
        self.credential.address()
    }

    /// Check the request shape before anything goes to the node.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.target == Address::ZERO {
            return Err(TxError::InvalidRequest("target address is empty".into()));
        }
        if self.payload.len() < 4 {
            return Err(TxError::InvalidRequest(
                "payload must start with a 4-byte function selector".into(),
            ));
        }
        if self.fees.gas_limit == Some(0) {
            return Err(TxError::InvalidRequest("gas limit must be positive".into()));
        }
        if let (Some(max_fee), Some(priority)) =
            (self.fees.max_fee_per_gas, self.fees.max_priority_fee_per_gas)
        {
            if priority > max_fee {
                return Err(TxError::InvalidRequest(format!(
                    "priority fee {priority} exceeds max fee {max_fee}"
                )));
            }
        }
        Ok(())
    }
}
