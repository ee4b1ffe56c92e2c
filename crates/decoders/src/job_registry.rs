use alloy::primitives::{B256, Log, keccak256};
use ciro_common::types::EventKind;
use serde_json::json;

use crate::{DecodedPayload, EventDecoder};

/// Decodes events emitted by the on-chain job registry contract:
/// `JobSubmitted`, `JobAssigned`, `JobCompleted`, `JobFailed`,
/// `JobCancelled`.
pub struct JobRegistryDecoder {
    job_submitted: B256,
    job_assigned: B256,
    job_completed: B256,
    job_failed: B256,
    job_cancelled: B256,
}

impl JobRegistryDecoder {
    pub fn new() -> Self {
        Self {
            job_submitted: keccak256("JobSubmitted(bytes32,address,bytes32)"),
            job_assigned: keccak256("JobAssigned(bytes32,address)"),
            job_completed: keccak256("JobCompleted(bytes32,address,bytes32)"),
            job_failed: keccak256("JobFailed(bytes32,address,bytes32)"),
            job_cancelled: keccak256("JobCancelled(bytes32)"),
        }
    }

    fn address_from_topic(topic: &B256) -> String {
        format!("0x{}", alloy::hex::encode(&topic.as_slice()[12..32]))
    }
}

impl Default for JobRegistryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for JobRegistryDecoder {
    fn event_signatures(&self, _abi_version: i32) -> Vec<B256> {
        vec![
            self.job_submitted,
            self.job_assigned,
            self.job_completed,
            self.job_failed,
            self.job_cancelled,
        ]
    }

    fn decode(&self, log: &Log, _abi_version: i32) -> Option<DecodedPayload> {
        let topic0 = log.topics().first()?;
        let data = log.data.data.as_ref();

        if *topic0 == self.job_submitted {
            let job_id = log.topics().get(1).map(|t| format!("{:#x}", t));
            let submitter = log.topics().get(2).map(Self::address_from_topic);

            Some(DecodedPayload {
                kind: EventKind::JobSubmitted,
                payload: json!({
                    "job_id": job_id,
                    "submitter": submitter,
                    "payload_hash": format!("0x{}", alloy::hex::encode(data)),
                }),
            })
        } else if *topic0 == self.job_assigned {
            let job_id = log.topics().get(1).map(|t| format!("{:#x}", t));
            let worker = log.topics().get(2).map(Self::address_from_topic);

            Some(DecodedPayload {
                kind: EventKind::JobAssigned,
                payload: json!({ "job_id": job_id, "worker": worker }),
            })
        } else if *topic0 == self.job_completed {
            let job_id = log.topics().get(1).map(|t| format!("{:#x}", t));
            let worker = log.topics().get(2).map(Self::address_from_topic);

            Some(DecodedPayload {
                kind: EventKind::JobCompleted,
                payload: json!({
                    "job_id": job_id,
                    "worker": worker,
                    "result_hash": format!("0x{}", alloy::hex::encode(data)),
                }),
            })
        } else if *topic0 == self.job_failed {
            let job_id = log.topics().get(1).map(|t| format!("{:#x}", t));
            let worker = log.topics().get(2).map(Self::address_from_topic);

            Some(DecodedPayload {
                kind: EventKind::JobFailed,
                payload: json!({
                    "job_id": job_id,
                    "worker": worker,
                    "reason_hash": format!("0x{}", alloy::hex::encode(data)),
                }),
            })
        } else if *topic0 == self.job_cancelled {
            let job_id = log.topics().get(1).map(|t| format!("{:#x}", t));

            Some(DecodedPayload {
                kind: EventKind::JobCancelled,
                payload: json!({ "job_id": job_id }),
            })
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "job_registry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_five_selectors() {
        let decoder = JobRegistryDecoder::new();
        assert_eq!(decoder.event_signatures(1).len(), 5);
    }
}
