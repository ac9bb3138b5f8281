//! Revert-reason decoding and node error explanations.

use alloy::sol_types::{Panic, Revert, SolError};

use crate::config::consts::ERROR_STRING_SELECTOR;

/// Decode Solidity `Error(string)` or `Panic(uint256)` revert data.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    if data[..4] == Revert::SELECTOR {
        return Revert::abi_decode(data).ok().map(|revert| revert.reason);
    }
    if data[..4] == Panic::SELECTOR {
        return Panic::abi_decode(data)
            .ok()
            .map(|panic| format!("panic code {:#x}", panic.code));
    }
    None
}

/// Find an `Error(string)` payload embedded in an error message and decode it.
///
/// Some nodes only report revert data inside the message text, e.g.
/// `execution reverted: 0x08c379a0...`.
pub fn revert_reason_from_message(message: &str) -> Option<String> {
    let needle = format!("0x{ERROR_STRING_SELECTOR}");
    let start = message.find(&needle)?;
    let remaining = &message[start + 2..];
    let end = remaining
        .char_indices()
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .map(|(i, _)| i)
        .unwrap_or(remaining.len());

    let bytes = hex::decode(&remaining[..end]).ok()?;
    decode_revert_data(&bytes)
}

/// Map common node rejection messages to something an operator can act on.
pub fn explain_node_error(message: &str) -> String {
    if let Some(reason) = revert_reason_from_message(message) {
        return format!("reverted: {reason}");
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient funds") {
        "insufficient funds for gas; fund the sending account".to_string()
    } else if lower.contains("replacement transaction underpriced") {
        "transaction underpriced; a pending transaction from this account may be blocking"
            .to_string()
    } else if lower.contains("nonce too low") {
        "nonce too low; a transaction with this nonce was already mined".to_string()
    } else {
        message.to_string()
    }
}

/// Whether a node error on broadcast means it already has this exact transaction.
pub fn is_already_known(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already known") || lower.contains("known transaction")
}
