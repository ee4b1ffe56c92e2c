use alloy::primitives::{B256, Log, U256, keccak256};
use ciro_common::types::EventKind;
use serde_json::json;

use crate::{DecodedPayload, EventDecoder};

/// Decodes events emitted by the on-chain worker/staking registry:
/// `WorkerRegistered`, `WorkerSlashed`, `StakeDeposited`,
/// `StakeWithdrawn`.
pub struct WorkerRegistryDecoder {
    worker_registered: B256,
    worker_slashed: B256,
    stake_deposited: B256,
    stake_withdrawn: B256,
}

impl WorkerRegistryDecoder {
    pub fn new() -> Self {
        Self {
            worker_registered: keccak256("WorkerRegistered(address)"),
            worker_slashed: keccak256("WorkerSlashed(address,uint256,bytes32)"),
            stake_deposited: keccak256("StakeDeposited(address,uint256)"),
            stake_withdrawn: keccak256("StakeWithdrawn(address,uint256)"),
        }
    }

    fn address_from_topic(topic: &B256) -> String {
        format!("0x{}", alloy::hex::encode(&topic.as_slice()[12..32]))
    }

    fn u256_from_data(data: &[u8], offset: usize) -> Option<String> {
        let bytes: [u8; 32] = data.get(offset..offset + 32)?.try_into().ok()?;
        Some(U256::from_be_bytes(bytes).to_string())
    }
}

impl Default for WorkerRegistryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for WorkerRegistryDecoder {
    fn event_signatures(&self, _abi_version: i32) -> Vec<B256> {
        vec![
            self.worker_registered,
            self.worker_slashed,
            self.stake_deposited,
            self.stake_withdrawn,
        ]
    }

    fn decode(&self, log: &Log, _abi_version: i32) -> Option<DecodedPayload> {
        let topic0 = log.topics().first()?;
        let data = log.data.data.as_ref();

        if *topic0 == self.worker_registered {
            let worker = log.topics().get(1).map(Self::address_from_topic);

            Some(DecodedPayload {
                kind: EventKind::WorkerRegistered,
                payload: json!({ "worker": worker }),
            })
        } else if *topic0 == self.worker_slashed {
            let worker = log.topics().get(1).map(Self::address_from_topic);
            let amount = Self::u256_from_data(data, 0);
            let reason_hash = log.topics().get(2).map(|t| format!("{:#x}", t));

            Some(DecodedPayload {
                kind: EventKind::WorkerSlashed,
                payload: json!({ "worker": worker, "amount": amount, "reason_hash": reason_hash }),
            })
        } else if *topic0 == self.stake_deposited {
            let worker = log.topics().get(1).map(Self::address_from_topic);
            let amount = Self::u256_from_data(data, 0);

            Some(DecodedPayload {
                kind: EventKind::StakeDeposited,
                payload: json!({ "worker": worker, "amount": amount }),
            })
        } else if *topic0 == self.stake_withdrawn {
            let worker = log.topics().get(1).map(Self::address_from_topic);
            let amount = Self::u256_from_data(data, 0);

            Some(DecodedPayload {
                kind: EventKind::StakeWithdrawn,
                payload: json!({ "worker": worker, "amount": amount }),
            })
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "worker_registry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_four_selectors() {
        let decoder = WorkerRegistryDecoder::new();
        assert_eq!(decoder.event_signatures(1).len(), 4);
    }
}
