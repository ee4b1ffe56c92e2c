use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{TimeZone, Utc};
use ciro_common::error::AppError;
use ciro_common::types::ChainEvent;
use ciro_decoders::DecoderRegistry;
use tokio::sync::watch;

use crate::cursor;
use crate::event_store::{PgEventStore, selector_string};
use crate::reorg::ReorgDetector;
use crate::rpc::RpcAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CatchUp,
    Live,
}

/// Drives the indexer through catch-up, live polling, and reorg recovery
/// (§4.3). Generalizes the inherited `BlockPoller`, which only did live
/// single-block polling, into a resumable batch catch-up phase plus a
/// phase transition back into catch-up whenever a reorg is detected.
pub struct Orchestrator {
    rpc: RpcAdapter,
    decoders: Arc<DecoderRegistry>,
    store: PgEventStore,
    reorg_detector: ReorgDetector,
    contract_addresses: Vec<Address>,
    poll_interval: Duration,
    batch_size: u64,
    reorg_safety: u64,
}

impl Orchestrator {
    pub fn new(
        rpc: RpcAdapter,
        decoders: DecoderRegistry,
        store: PgEventStore,
        contract_addresses: Vec<Address>,
        poll_interval: Duration,
        batch_size: u64,
        reorg_safety: u64,
    ) -> Self {
        Self {
            rpc,
            decoders: Arc::new(decoders),
            store,
            reorg_detector: ReorgDetector::new((reorg_safety * 2).max(16) as usize),
            contract_addresses,
            poll_interval,
            batch_size,
            reorg_safety,
        }
    }

    /// Runs until `shutdown` fires, finishing the in-flight batch or
    /// block and committing at the next safe boundary before returning —
    /// matching the inherited `main.rs`'s `tokio::select!` against
    /// `ctrl_c()`, generalized to an explicit watch channel so tests and
    /// the binary entry point share the same shutdown path.
    pub async fn run(&mut self, from_block: u64, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        cursor::bootstrap(self.store_pool(), from_block).await?;

        let tip = self.rpc.latest_block_number().await?;
        let mut current_block = from_block;
        let mut phase = if tip.saturating_sub(current_block) > self.reorg_safety {
            Phase::CatchUp
        } else {
            Phase::Live
        };

        loop {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested, stopping orchestrator");
                return Ok(());
            }

            let tip = self.rpc.latest_block_number().await?;
            let safe_tip = tip.saturating_sub(self.reorg_safety);

            match phase {
                Phase::CatchUp => {
                    if current_block > safe_tip {
                        phase = Phase::Live;
                        continue;
                    }
                    let batch_end = (current_block + self.batch_size - 1).min(safe_tip);
                    current_block = self.process_batch(current_block, batch_end).await?;
                }
                Phase::Live => {
                    if current_block > safe_tip {
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval) => {}
                            _ = shutdown.changed() => continue,
                        }
                        continue;
                    }
                    current_block = self.process_one(current_block).await?;
                }
            }
        }
    }

    async fn process_batch(&mut self, from: u64, to: u64) -> anyhow::Result<u64> {
        for block_number in from..=to {
            let next = self.process_one(block_number).await?;
            if next <= block_number {
                // a reorg sent us backward; restart the batch from there
                return Ok(next);
            }
        }
        Ok(to + 1)
    }

    /// Processes a single block: detects reorgs, fetches+decodes logs,
    /// appends the batch, advances the cursor. Returns the next block
    /// number to process (lower than the input if a reorg occurred).
    async fn process_one(&mut self, block_number: u64) -> Result<u64, AppError> {
        let block = self.rpc.block_by_number(block_number).await?;
        let block_hash = block.header.hash;
        let parent_hash = block.header.parent_hash;
        let block_timestamp = Utc
            .timestamp_opt(block.header.timestamp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        if let Some(ancestor) = self
            .reorg_detector
            .check_and_record(block_number, block_hash, parent_hash, &self.rpc)
            .await?
        {
            let deleted = self
                .store
                .delete_above(ancestor + 1, "parent hash mismatch during live polling")
                .await?;
            tracing::warn!(ancestor, deleted, "reorg resolved, resuming catch-up from ancestor");
            return Ok(ancestor + 1);
        }

        let logs = self
            .rpc
            .events_in_range(&self.contract_addresses, block_number, block_number)
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let tx_hash = log
                .transaction_hash
                .map(|h| format!("{h:#x}"))
                .unwrap_or_default();
            let tx_index = log.transaction_index.unwrap_or_default();
            let event_index = log.log_index.unwrap_or_default();

            let decoded = if log.inner.data.data.len() > 4096 {
                let inner = log.inner.clone();
                let decoders = self.decoders.clone();
                tokio::task::spawn_blocking(move || decoders.decode(&inner))
                    .await
                    .map_err(|e| AppError::Fatal(format!("decode task panicked: {e}")))?
            } else {
                self.decoders.decode(&log.inner)
            };

            let topic0 = log
                .inner
                .topics()
                .first()
                .copied()
                .unwrap_or_default();

            events.push(ChainEvent {
                tx_hash,
                tx_index,
                event_index,
                block_number,
                block_hash: format!("{block_hash:#x}"),
                block_timestamp,
                contract_address: format!("{:#x}", log.inner.address),
                event_selector: selector_string(topic0),
                abi_version: 1,
                kind: decoded.kind,
                payload: decoded.payload,
                is_reorged: false,
            });
        }

        let cursor = cursor::load(self.store_pool())
            .await?
            .ok_or_else(|| AppError::Fatal("indexer cursor missing after bootstrap".into()))?;

        self.store
            .append_batch(&events, block_number, &format!("{block_hash:#x}"), cursor.version)
            .await?;

        Ok(block_number + 1)
    }

    fn store_pool(&self) -> &sqlx::PgPool {
        // exposed via a crate-private accessor so orchestrator and cursor
        // module share one pool without threading it through every call
        self.store.pool()
    }
}
