use alloy::primitives::B256;
use ciro_common::db::refresh_network_health;
use ciro_common::error::AppError;
use ciro_common::types::{ChainEvent, EventKind};
use sqlx::PgPool;

/// Durable storage for decoded chain events and the reorg audit trail.
///
/// Promoted out of the indexer's main loop (which the inherited poller
/// inlined as ad hoc queries) because the orchestrator, the reorg
/// resolver, and the query/dashboard API all need the same read/write
/// operations against the same tables.
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Appends a batch of events and advances the cursor in one
    /// transaction. The unique index on `(block_hash, tx_index,
    /// event_index)` combined with `ON CONFLICT DO NOTHING` gives
    /// at-most-once insertion, generalizing the inherited
    /// `(tx_hash, log_index)` key to the richer one this schema needs
    /// (a transaction can emit more than one event at the same log index
    /// is never true in practice, but `tx_index`/`event_index` make the
    /// key unambiguous even for logs without a transaction hash, e.g.
    /// synthetic system logs).
    pub async fn append_batch(
        &self,
        events: &[ChainEvent],
        new_cursor_block: u64,
        new_cursor_hash: &str,
        expected_version: i64,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    tx_hash, tx_index, event_index, block_number, block_hash, block_timestamp,
                    contract_address, event_selector, abi_version, kind, payload, is_reorged
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, false)
                ON CONFLICT (block_hash, tx_index, event_index) DO NOTHING
                "#,
            )
            .bind(&event.tx_hash)
            .bind(event.tx_index as i64)
            .bind(event.event_index as i64)
            .bind(event.block_number as i64)
            .bind(&event.block_hash)
            .bind(event.block_timestamp)
            .bind(&event.contract_address)
            .bind(&event.event_selector)
            .bind(event.abi_version)
            .bind(event.kind.to_string())
            .bind(&event.payload)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE indexer_cursors
            SET last_indexed_block = $1, last_indexed_hash = $2, version = version + 1, updated_at = NOW()
            WHERE chain_id = 1 AND version = $3
            "#,
        )
        .bind(new_cursor_block as i64)
        .bind(new_cursor_hash)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Consistency(format!(
                "cursor version mismatch: expected {expected_version}, concurrent writer advanced it"
            )));
        }

        tx.commit().await?;
        refresh_network_health(&self.pool).await;
        Ok(())
    }

    pub async fn read_range(
        &self,
        contract_address: Option<&str>,
        from_block: u64,
        to_block: u64,
        kind: Option<EventKind>,
    ) -> Result<Vec<ChainEvent>, AppError> {
        let rows = sqlx::query_as::<_, ChainEventRow>(
            r#"
            SELECT tx_hash, tx_index, event_index, block_number, block_hash, block_timestamp,
                   contract_address, event_selector, abi_version, kind, payload, is_reorged
            FROM events
            WHERE block_number BETWEEN $1 AND $2
              AND is_reorged = false
              AND ($3::text IS NULL OR contract_address = $3)
              AND ($4::text IS NULL OR kind = $4)
            ORDER BY block_number, tx_index, event_index
            "#,
        )
        .bind(from_block as i64)
        .bind(to_block as i64)
        .bind(contract_address)
        .bind(kind.map(|k| k.to_string()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn latest_of(
        &self,
        contract_address: &str,
        kind: EventKind,
    ) -> Result<Option<ChainEvent>, AppError> {
        let row = sqlx::query_as::<_, ChainEventRow>(
            r#"
            SELECT tx_hash, tx_index, event_index, block_number, block_hash, block_timestamp,
                   contract_address, event_selector, abi_version, kind, payload, is_reorged
            FROM events
            WHERE contract_address = $1 AND kind = $2 AND is_reorged = false
            ORDER BY block_number DESC, tx_index DESC, event_index DESC
            LIMIT 1
            "#,
        )
        .bind(contract_address)
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Deletes every event from `block_number` onward and records the
    /// deletion in `reorg_audit`, giving the stronger invariant that no
    /// event from an abandoned fork is ever visible — the inherited
    /// `rollback_events_from` only flipped an `is_reorged` flag.
    pub async fn delete_above(&self, block_number: u64, reason: &str) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM events WHERE block_number >= $1")
            .bind(block_number as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO reorg_audit (from_block, deleted_count, reason, occurred_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(block_number as i64)
        .bind(deleted as i64)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::warn!(from_block = block_number, deleted, reason, "deleted reorged events");
        Ok(deleted)
    }
}

#[derive(sqlx::FromRow)]
struct ChainEventRow {
    tx_hash: String,
    tx_index: i64,
    event_index: i64,
    block_number: i64,
    block_hash: String,
    block_timestamp: chrono::DateTime<chrono::Utc>,
    contract_address: String,
    event_selector: String,
    abi_version: i32,
    kind: String,
    payload: serde_json::Value,
    is_reorged: bool,
}

impl From<ChainEventRow> for ChainEvent {
    fn from(row: ChainEventRow) -> Self {
        ChainEvent {
            tx_hash: row.tx_hash,
            tx_index: row.tx_index as u64,
            event_index: row.event_index as u64,
            block_number: row.block_number as u64,
            block_hash: row.block_hash,
            block_timestamp: row.block_timestamp,
            contract_address: row.contract_address,
            event_selector: row.event_selector,
            abi_version: row.abi_version,
            kind: parse_kind(&row.kind),
            payload: row.payload,
            is_reorged: row.is_reorged,
        }
    }
}

fn parse_kind(raw: &str) -> EventKind {
    match raw {
        "job_submitted" => EventKind::JobSubmitted,
        "job_assigned" => EventKind::JobAssigned,
        "job_completed" => EventKind::JobCompleted,
        "job_failed" => EventKind::JobFailed,
        "job_cancelled" => EventKind::JobCancelled,
        "worker_registered" => EventKind::WorkerRegistered,
        "worker_slashed" => EventKind::WorkerSlashed,
        "stake_deposited" => EventKind::StakeDeposited,
        "stake_withdrawn" => EventKind::StakeWithdrawn,
        "cross_rollup_message" => EventKind::CrossRollupMessage,
        _ => EventKind::Undecodable,
    }
}

/// Formats a `B256` topic as the canonical event selector string stored
/// alongside each event.
pub fn selector_string(topic: B256) -> String {
    format!("{topic:#x}")
}
