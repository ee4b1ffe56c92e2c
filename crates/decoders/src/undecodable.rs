use alloy::primitives::Log;
use ciro_common::types::EventKind;
use serde_json::json;

use crate::DecodedPayload;

/// Always-registered fallback capture for logs no typed decoder claims.
///
/// Unlike the opt-in generic decoder this is generalized from, this one
/// is never omitted: the cursor still advances over an undecodable log
/// (§4.2, §7 Protocol handling), and the raw topics/data are preserved so
/// an operator can add a typed decoder later without having lost the
/// event.
pub struct UndecodableDecoder;

impl UndecodableDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn capture(&self, log: &Log) -> DecodedPayload {
        let topic0 = log.topics().first().map(|t| format!("{:#x}", t));
        let topics: Vec<String> = log.topics().iter().map(|t| format!("{:#x}", t)).collect();

        DecodedPayload {
            kind: EventKind::Undecodable,
            payload: json!({
                "contract_address": format!("{:#x}", log.address),
                "topic0": topic0,
                "topics": topics,
                "data": format!("0x{}", alloy::hex::encode(log.data.data.as_ref())),
            }),
        }
    }
}

impl Default for UndecodableDecoder {
    fn default() -> Self {
        Self::new()
    }
}
