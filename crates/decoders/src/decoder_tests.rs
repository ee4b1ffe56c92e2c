//! Integration tests for the contract decoders and `DecoderRegistry` routing.
//!
//! These construct realistic `alloy::primitives::Log` structs matching
//! on-chain EVM log layout and verify decoders extract event kinds and
//! fields correctly, and that the registry routes by the highest
//! registered ABI version.

use alloy::primitives::{Address, B256, Bytes, Log, LogData, U256, keccak256};

use ciro_common::types::EventKind;

use crate::bridge::BridgeDecoder;
use crate::job_registry::JobRegistryDecoder;
use crate::worker_registry::WorkerRegistryDecoder;
use crate::{ContractAddresses, DecoderRegistry, EventDecoder};

fn build_log(topics: Vec<B256>, data: Vec<u8>, address: Address) -> Log {
    Log {
        address,
        data: LogData::new(topics, Bytes::from(data)).expect("valid log data"),
    }
}

fn encode_u256(val: u64) -> [u8; 32] {
    U256::from(val).to_be_bytes::<32>()
}

fn address_to_topic(addr: Address) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[12..32].copy_from_slice(addr.as_slice());
    B256::from(bytes)
}

const JOB_REGISTRY: Address = Address::repeat_byte(0x01);
const WORKER_REGISTRY: Address = Address::repeat_byte(0x02);
const BRIDGE: Address = Address::repeat_byte(0x03);

fn addresses() -> ContractAddresses {
    ContractAddresses {
        job_registry: format!("{:#x}", JOB_REGISTRY),
        worker_registry: format!("{:#x}", WORKER_REGISTRY),
        bridge: format!("{:#x}", BRIDGE),
    }
}

// ───────────────────────── job registry decoder ─────────────────────────

#[test]
fn job_submitted_decodes_submitter() {
    let decoder = JobRegistryDecoder::new();
    let topic0 = keccak256("JobSubmitted(bytes32,address,bytes32)");
    let job_id = B256::repeat_byte(0x11);
    let submitter = Address::repeat_byte(0xAB);

    let log = build_log(
        vec![topic0, job_id, address_to_topic(submitter)],
        vec![],
        JOB_REGISTRY,
    );

    let decoded = decoder.decode(&log, 1).unwrap();
    assert_eq!(decoded.kind, EventKind::JobSubmitted);
    assert!(
        decoded.payload["submitter"]
            .as_str()
            .unwrap()
            .contains("abababab")
    );
}

#[test]
fn job_completed_decodes_worker() {
    let decoder = JobRegistryDecoder::new();
    let topic0 = keccak256("JobCompleted(bytes32,address,bytes32)");
    let job_id = B256::repeat_byte(0x22);
    let worker = Address::repeat_byte(0xCD);

    let log = build_log(
        vec![topic0, job_id, address_to_topic(worker)],
        vec![],
        JOB_REGISTRY,
    );

    let decoded = decoder.decode(&log, 1).unwrap();
    assert_eq!(decoded.kind, EventKind::JobCompleted);
}

#[test]
fn unknown_topic_returns_none() {
    let decoder = JobRegistryDecoder::new();
    let unknown = keccak256("SomeUnknownEvent(uint256)");
    let log = build_log(vec![unknown], vec![], JOB_REGISTRY);
    assert!(decoder.decode(&log, 1).is_none());
}

// ───────────────────────── worker registry decoder ─────────────────────────

#[test]
fn worker_slashed_decodes_amount() {
    let decoder = WorkerRegistryDecoder::new();
    let topic0 = keccak256("WorkerSlashed(address,uint256,bytes32)");
    let worker = Address::repeat_byte(0x44);
    let reason = B256::repeat_byte(0x55);

    let log = build_log(
        vec![topic0, address_to_topic(worker), reason],
        encode_u256(1_000).to_vec(),
        WORKER_REGISTRY,
    );

    let decoded = decoder.decode(&log, 1).unwrap();
    assert_eq!(decoded.kind, EventKind::WorkerSlashed);
    assert_eq!(decoded.payload["amount"].as_str().unwrap(), "1000");
}

// ───────────────────────── bridge decoder ─────────────────────────

#[test]
fn bridge_message_is_observed_only() {
    let decoder = BridgeDecoder::new();
    let topic0 = keccak256("CrossRollupMessage(uint256,bytes32,bytes)");
    let chain_id = encode_u256(42);
    let message_hash = B256::repeat_byte(0x66);

    let log = build_log(
        vec![topic0, B256::from(chain_id), message_hash],
        vec![],
        BRIDGE,
    );

    let decoded = decoder.decode(&log, 1).unwrap();
    assert_eq!(decoded.kind, EventKind::CrossRollupMessage);
}

// ───────────────────────── registry routing ─────────────────────────

#[test]
fn registry_routes_job_registry_event() {
    let registry = DecoderRegistry::new(&addresses());
    let topic0 = keccak256("JobAssigned(bytes32,address)");
    let job_id = B256::repeat_byte(0x77);
    let worker = Address::repeat_byte(0x88);

    let log = build_log(
        vec![topic0, job_id, address_to_topic(worker)],
        vec![],
        JOB_REGISTRY,
    );

    let decoded = registry.decode(&log);
    assert_eq!(decoded.kind, EventKind::JobAssigned);
}

#[test]
fn registry_falls_back_to_undecodable_for_unknown_selector() {
    let registry = DecoderRegistry::new(&addresses());
    let unknown = keccak256("NobodyKnowsThisEvent(bytes32)");

    let log = build_log(vec![unknown], vec![], JOB_REGISTRY);
    let decoded = registry.decode(&log);
    assert_eq!(decoded.kind, EventKind::Undecodable);
}

#[test]
fn registry_falls_back_to_undecodable_for_unregistered_contract() {
    let registry = DecoderRegistry::new(&addresses());
    let topic0 = keccak256("JobSubmitted(bytes32,address,bytes32)");

    let log = build_log(vec![topic0], vec![], Address::repeat_byte(0xFF));
    let decoded = registry.decode(&log);
    assert_eq!(decoded.kind, EventKind::Undecodable);
}

#[test]
fn registry_captures_undecodable_topics_and_data() {
    let registry = DecoderRegistry::new(&addresses());
    let unknown = keccak256("NobodyKnowsThisEvent(bytes32)");

    let log = build_log(vec![unknown], encode_u256(7).to_vec(), JOB_REGISTRY);
    let decoded = registry.decode(&log);
    assert!(decoded.payload["topics"].as_array().is_some());
    assert!(decoded.payload["data"].as_str().is_some());
}
