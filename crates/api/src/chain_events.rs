//! On-chain fact consumer — folds `JobCompleted`/`JobFailed`/`WorkerSlashed`
//! events already persisted by the indexer into the Reputation Engine, so
//! reputation reflects on-chain settlement outcomes and not only what the
//! Coordinator Facade observed directly over HTTP.
//!
//! Tracks its own progress in `coordinator_event_cursor`, a table separate
//! from the indexer's `indexer_cursors`: the two track different things —
//! how far chain-tailing has advanced versus how far reputation has caught
//! up on events already durable in `events`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use ciro_common::error::AppError;
use ciro_common::types::{EventKind, PenaltyKind};
use ciro_coordinator::reputation::ReputationEngine;
use ciro_coordinator::workers::WorkerRegistry;
use ciro_indexer::event_store::PgEventStore;
use ciro_indexer::rpc::RpcAdapter;

const KINDS: [EventKind; 3] = [EventKind::JobCompleted, EventKind::JobFailed, EventKind::WorkerSlashed];

pub struct ChainEventConsumer {
    pool: PgPool,
    store: PgEventStore,
    reputation: Arc<ReputationEngine>,
}

impl ChainEventConsumer {
    pub fn new(pool: PgPool, store: PgEventStore, reputation: Arc<ReputationEngine>) -> Self {
        Self { pool, store, reputation }
    }

    async fn cursor(&self) -> Result<u64, AppError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_processed_block FROM coordinator_event_cursor WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(block,)| block as u64).unwrap_or(0))
    }

    async fn advance_cursor(&self, block: u64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO coordinator_event_cursor (id, last_processed_block, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET last_processed_block = EXCLUDED.last_processed_block, updated_at = NOW()
            "#,
        )
        .bind(block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads every `JobCompleted`/`JobFailed`/`WorkerSlashed` event between
    /// the saved cursor and `tip`, and applies its reputation consequence.
    pub async fn poll_once(&self, tip: u64) -> Result<u64, AppError> {
        let from = self.cursor().await? + 1;
        if from > tip {
            return Ok(0);
        }

        let mut applied = 0u64;
        for kind in KINDS {
            let events = self.store.read_range(None, from, tip, Some(kind)).await?;
            for event in events {
                let Some(address) = event.payload.get("worker").and_then(|v| v.as_str()) else {
                    tracing::warn!(kind = %kind, "on-chain event missing worker address, skipping");
                    continue;
                };

                let worker = match WorkerRegistry::get_by_address(&self.pool, address).await {
                    Ok(worker) => worker,
                    Err(AppError::NotFound(_)) => {
                        tracing::warn!(address, kind = %kind, "on-chain event for unregistered worker, skipping");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                match kind {
                    EventKind::JobCompleted => {
                        self.reputation.record_success(worker.id).await?;
                    }
                    EventKind::JobFailed => {
                        self.reputation.record_failure(worker.id).await?;
                    }
                    EventKind::WorkerSlashed => {
                        self.reputation
                            .apply_penalty(worker.id, PenaltyKind::MaliciousBehavior, "on-chain slash event", None)
                            .await?;
                    }
                    _ => unreachable!("KINDS only contains the three variants matched above"),
                }
                applied += 1;
            }
        }

        self.advance_cursor(tip).await?;
        Ok(applied)
    }

    /// Polls on a fixed interval until the process exits, using the
    /// RPC Adapter's current chain tip as the upper bound each tick.
    pub async fn run(self, rpc: Arc<RpcAdapter>, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            let tip = match rpc.latest_block_number().await {
                Ok(tip) => tip,
                Err(e) => {
                    tracing::error!(error = %e, "chain event consumer failed to fetch tip");
                    continue;
                }
            };
            match self.poll_once(tip).await {
                Ok(0) => {}
                Ok(applied) => tracing::info!(applied, tip, "applied on-chain reputation facts"),
                Err(e) => tracing::error!(error = %e, "chain event consumer poll failed"),
            }
        }
    }
}
