//! Contract interface descriptor.
//!
//! Wraps a JSON ABI artifact and turns `(method, args)` into calldata and
//! return data back into values. The transaction manager never looks inside the
//! ABI; it only receives the encoded bytes produced here.

use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    json_abi::{Function, JsonAbi},
    primitives::Bytes,
};
use anyhow::Context;
use std::{fs, path::Path};

use crate::error::TxError;

/// ABI of the DPoS election contract the relay is deployed against.
const DPOS_ABI_JSON: &str = include_str!("../abi/DPoS.json");

/// Functions the election client calls; a replacement ABI must declare all of them.
pub const ELECTION_METHODS: [&str; 5] =
    ["electionActive", "getWinner", "startElection", "endElection", "vote"];

#[derive(Debug, Clone)]
pub struct ContractAbi {
    abi: JsonAbi,
}

impl ContractAbi {
    /// The bundled DPoS election ABI.
    pub fn dpos() -> Self {
        Self::from_json(DPOS_ABI_JSON).expect("bundled DPoS ABI is valid JSON")
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let abi: JsonAbi = serde_json::from_str(json).context("failed to parse contract ABI")?;
        Ok(Self { abi })
    }

    /// Load an ABI artifact from disk.
    ///
    /// Accepts either a bare ABI array or a compiler artifact with an `abi` field.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read ABI file {}", path.display()))?;

        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("ABI file {} is not JSON", path.display()))?;
        let abi_value = match value {
            serde_json::Value::Object(mut artifact) => artifact
                .remove("abi")
                .with_context(|| format!("{} has no `abi` field", path.display()))?,
            other => other,
        };

        let abi: JsonAbi = serde_json::from_value(abi_value)
            .with_context(|| format!("failed to parse ABI in {}", path.display()))?;
        Ok(Self { abi })
    }

    pub fn has_function(&self, method: &str) -> bool {
        self.abi.function(method).is_some()
    }

    /// Names from `methods` this ABI does not declare.
    pub fn missing_functions<'a>(&self, methods: &[&'a str]) -> Vec<&'a str> {
        methods
            .iter()
            .copied()
            .filter(|method| !self.has_function(method))
            .collect()
    }

    /// Encode a call to `method` (selector followed by the ABI-encoded arguments).
    pub fn encode_call(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, TxError> {
        let function = self.resolve(method, args.len())?;
        let data = function
            .abi_encode_input(args)
            .map_err(|e| TxError::InvalidRequest(format!("cannot encode {method}: {e}")))?;
        Ok(data.into())
    }

    /// Decode the return data of a call to `method`.
    pub fn decode_output(&self, method: &str, data: &[u8]) -> Result<Vec<DynSolValue>, TxError> {
        let functions = self.abi.function(method).ok_or_else(|| TxError::QueryFailed {
            method: method.to_string(),
            reason: "method not in ABI".into(),
        })?;
        // Overloads may share a name; the first whose outputs decode wins.
        let mut last_err = None;
        for function in functions {
            match function.abi_decode_output(data) {
                Ok(values) => return Ok(values),
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(TxError::QueryFailed {
            method: method.to_string(),
            reason: format!(
                "undecodable return data: {}",
                last_err.unwrap_or_else(|| "no candidates".into())
            ),
        })
    }

    fn resolve(&self, method: &str, arg_count: usize) -> Result<&Function, TxError> {
        let functions = self
            .abi
            .function(method)
            .ok_or_else(|| TxError::InvalidRequest(format!("method {method} not in ABI")))?;
        functions
            .iter()
            .find(|f| f.inputs.len() == arg_count)
            .ok_or_else(|| {
                TxError::InvalidRequest(format!(
                    "{method} takes {} argument(s), got {arg_count}",
                    functions[0].inputs.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Address};

    #[test]
    fn test_encode_vote() {
        let abi = ContractAbi::dpos();
        let candidate: Address = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"
            .parse()
            .unwrap();

        let data = abi
            .encode_call("vote", &[DynSolValue::Address(candidate)])
            .unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &keccak256("vote(address)")[..4]);
        assert_eq!(&data[16..], candidate.as_slice());
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let abi = ContractAbi::dpos();
        assert!(matches!(
            abi.encode_call("unknownMethod", &[]),
            Err(TxError::InvalidRequest(_))
        ));
        assert!(matches!(
            abi.encode_call("vote", &[]),
            Err(TxError::InvalidRequest(_))
        ));
        assert!(matches!(
            abi.encode_call("vote", &[DynSolValue::Bool(true)]),
            Err(TxError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_decode_bool_output() {
        let abi = ContractAbi::dpos();
        let mut word = [0u8; 32];
        word[31] = 1;
        let values = abi.decode_output("electionActive", &word).unwrap();
        assert_eq!(values, vec![DynSolValue::Bool(true)]);
    }

    #[test]
    fn test_decode_garbage_is_query_failed() {
        let abi = ContractAbi::dpos();
        let err = abi.decode_output("getWinner", &[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, TxError::QueryFailed { .. }));
    }

    #[test]
    fn test_missing_functions() {
        let abi = ContractAbi::from_json(
            r#"[{"type":"function","name":"vote","inputs":[{"name":"candidate","type":"address"}],"outputs":[],"stateMutability":"nonpayable"}]"#,
        )
        .unwrap();
        assert_eq!(
            abi.missing_functions(&ELECTION_METHODS),
            vec!["electionActive", "getWinner", "startElection", "endElection"]
        );
    }

    #[test]
    fn test_load_artifact_with_abi_field() {
        let path = std::env::temp_dir().join("dpos_relay_artifact_test.json");
        let artifact = format!(r#"{{"contractName":"DPoS","abi":{DPOS_ABI_JSON}}}"#);
        fs::write(&path, artifact).unwrap();

        let abi = ContractAbi::load(&path).unwrap();
        assert!(abi.missing_functions(&ELECTION_METHODS).is_empty());

        fs::remove_file(&path).unwrap();
    }
}
