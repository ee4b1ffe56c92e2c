pub mod bridge;
pub mod job_registry;
pub mod undecodable;
pub mod worker_registry;

#[cfg(test)]
mod decoder_tests;

use std::collections::HashMap;

use alloy::primitives::{B256, Log};
use ciro_common::types::EventKind;

/// Output of a successful decode: the recognized kind plus a JSON payload
/// shaped for the event store's `payload` column. `tx_hash`, `tx_index`,
/// `event_index`, `block_hash` and `block_timestamp` are filled in by the
/// indexer, which has access to the enclosing block/receipt context the
/// decoder doesn't.
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Implemented by one decoder per contract family (job registry, worker
/// registry, bridge). A decoder only needs to recognize the selectors it
/// owns; the registry tries each registered decoder for the log's topic0.
pub trait EventDecoder: Send + Sync {
    /// Event topic signatures (`keccak256(Signature(args))`) this decoder
    /// recognizes, for the given ABI version.
    fn event_signatures(&self, abi_version: i32) -> Vec<B256>;

    /// Attempt to decode a single log. Returns `None` if this decoder
    /// doesn't own the log's topic0.
    fn decode(&self, log: &Log, abi_version: i32) -> Option<DecodedPayload>;

    fn name(&self) -> &'static str;
}

/// Key identifying one registered decoder entry: a contract's event
/// selector at a specific ABI version. Kept distinct from `(contract,
/// selector)` alone so a contract upgrade that changes an event's schema
/// doesn't require removing the old decoder — both versions coexist and
/// the registry resolves the one that applies to a given block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    contract_address: String,
    event_selector: B256,
}

struct RegisteredDecoder {
    abi_version: i32,
    decoder: std::sync::Arc<dyn EventDecoder>,
}

/// Version-aware decoder lookup, keyed by `(contract_address,
/// event_selector, abi_version)`. Unlike a flat decoder list, registering
/// a new ABI version for an already-known selector doesn't displace the
/// old one — both remain resolvable, and `decode` picks the highest
/// registered version unless the caller pins an older one explicitly
/// (used when replaying historical blocks under a superseded ABI).
pub struct DecoderRegistry {
    entries: HashMap<RegistryKey, Vec<RegisteredDecoder>>,
    undecodable: undecodable::UndecodableDecoder,
}

impl DecoderRegistry {
    /// Registers the closed set of known decoders (§4.2 Design Notes):
    /// `job_registry`, `worker_registry`, `bridge`. New event kinds
    /// require a migration entry and a registered decoder, not open-ended
    /// polymorphism.
    pub fn new(contract_addresses: &ContractAddresses) -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
            undecodable: undecodable::UndecodableDecoder::new(),
        };

        registry.register(
            &contract_addresses.job_registry,
            1,
            std::sync::Arc::new(job_registry::JobRegistryDecoder::new()),
        );
        registry.register(
            &contract_addresses.worker_registry,
            1,
            std::sync::Arc::new(worker_registry::WorkerRegistryDecoder::new()),
        );
        registry.register(
            &contract_addresses.bridge,
            1,
            std::sync::Arc::new(bridge::BridgeDecoder::new()),
        );

        registry
    }

    fn register(
        &mut self,
        contract_address: &str,
        abi_version: i32,
        decoder: std::sync::Arc<dyn EventDecoder>,
    ) {
        for selector in decoder.event_signatures(abi_version) {
            let key = RegistryKey {
                contract_address: contract_address.to_lowercase(),
                event_selector: selector,
            };
            self.entries.entry(key).or_default().push(RegisteredDecoder {
                abi_version,
                decoder: decoder.clone(),
            });
        }
    }

    /// Decode a log, preferring the highest registered ABI version for
    /// its `(contract, selector)` pair. Falls back to the mandatory
    /// undecodable capture (§4.2) when no typed decoder claims the log —
    /// the cursor still advances; the event is persisted, not dropped.
    pub fn decode(&self, log: &Log) -> DecodedPayload {
        self.decode_pinned(log, None)
    }

    /// Same as `decode`, but pins resolution to a specific ABI version
    /// when replaying a block range known to predate a contract upgrade.
    pub fn decode_pinned(&self, log: &Log, pinned_abi_version: Option<i32>) -> DecodedPayload {
        let Some(topic0) = log.topics().first() else {
            return self.undecodable.capture(log);
        };
        let contract_address = format!("{:#x}", log.address);

        let key = RegistryKey {
            contract_address,
            event_selector: *topic0,
        };

        let Some(candidates) = self.entries.get(&key) else {
            return self.undecodable.capture(log);
        };

        let chosen = match pinned_abi_version {
            Some(v) => candidates.iter().find(|c| c.abi_version == v),
            None => candidates.iter().max_by_key(|c| c.abi_version),
        };

        match chosen.and_then(|c| c.decoder.decode(log, c.abi_version)) {
            Some(decoded) => {
                tracing::debug!(kind = %decoded.kind, "decoded event");
                decoded
            }
            None => self.undecodable.capture(log),
        }
    }
}

/// Well-known contract addresses this registry watches. Resolved once at
/// startup (env/CLI) and handed to `DecoderRegistry::new`.
#[derive(Debug, Clone, Default)]
pub struct ContractAddresses {
    pub job_registry: String,
    pub worker_registry: String,
    pub bridge: String,
}
