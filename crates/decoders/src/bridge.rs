use alloy::primitives::{B256, Log, keccak256};
use ciro_common::types::EventKind;
use serde_json::json;

use crate::{DecodedPayload, EventDecoder};

/// Decodes cross-rollup bridge messages. Observed only — nothing in this
/// workspace acts on a `CrossRollupMessage` beyond recording it (Non-goal:
/// no bridging logic beyond observation).
pub struct BridgeDecoder {
    cross_rollup_message: B256,
}

impl BridgeDecoder {
    pub fn new() -> Self {
        Self {
            cross_rollup_message: keccak256("CrossRollupMessage(uint256,bytes32,bytes)"),
        }
    }
}

impl Default for BridgeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for BridgeDecoder {
    fn event_signatures(&self, _abi_version: i32) -> Vec<B256> {
        vec![self.cross_rollup_message]
    }

    fn decode(&self, log: &Log, _abi_version: i32) -> Option<DecodedPayload> {
        let topic0 = log.topics().first()?;
        if *topic0 != self.cross_rollup_message {
            return None;
        }

        let destination_chain_id = log.topics().get(1).map(|t| {
            let bytes = t.as_slice();
            u64::from_be_bytes(bytes[24..32].try_into().unwrap_or_default())
        });
        let message_hash = log.topics().get(2).map(|t| format!("{:#x}", t));

        Some(DecodedPayload {
            kind: EventKind::CrossRollupMessage,
            payload: json!({
                "destination_chain_id": destination_chain_id,
                "message_hash": message_hash,
                "data": format!("0x{}", alloy::hex::encode(log.data.data.as_ref())),
            }),
        })
    }

    fn name(&self) -> &'static str {
        "bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_one_selector() {
        let decoder = BridgeDecoder::new();
        assert_eq!(decoder.event_signatures(1).len(), 1);
    }
}
