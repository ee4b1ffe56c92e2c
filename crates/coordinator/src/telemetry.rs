//! Telemetry Sink — ingests signed worker heartbeats (§4.5).
//!
//! Workers already hold a chain key (the same one their on-chain stake is
//! registered under), so heartbeat authentication reuses ECDSA recovery
//! instead of adding a session/login layer — possession of the key is the
//! only credential.

use alloy::primitives::Address;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use ciro_common::error::AppError;
use ciro_common::signing::{heartbeat_message, verify_heartbeat_signature};
use ciro_common::types::{WorkerHealth, WorkerStatus};

use crate::bus::{CoordinatorEvent, EventBus};

/// A worker's self-reported load sample, signed with its registered key.
#[derive(Debug, Clone)]
pub struct HeartbeatInput {
    pub worker_id: Uuid,
    pub worker_address: Address,
    pub monotonic_sequence: u64,
    pub sampled_at_unix: i64,
    pub cpu_load: f64,
    pub gpu_load: f64,
    pub memory_used_bytes: i64,
    pub memory_total_bytes: i64,
    pub queue_depth: i32,
    pub signature: Vec<u8>,
}

pub struct TelemetrySink {
    pool: PgPool,
    bus: EventBus,
    heartbeat_ttl_secs: i64,
}

impl TelemetrySink {
    pub fn new(pool: PgPool, bus: EventBus, heartbeat_ttl_secs: i64) -> Self {
        Self {
            pool,
            bus,
            heartbeat_ttl_secs,
        }
    }

    /// Validates signature, staleness and monotonic sequence, then persists
    /// the sample and republishes it as a `HealthChanged` fact consumed by
    /// the Reputation Engine and the Job Distributor's eligibility checks.
    pub async fn ingest(&self, input: HeartbeatInput) -> Result<WorkerHealth, AppError> {
        let now = Utc::now().timestamp();
        if now - input.sampled_at_unix > self.heartbeat_ttl_secs {
            return Err(AppError::Input(format!(
                "heartbeat is stale: sampled {}s ago, ttl is {}s",
                now - input.sampled_at_unix,
                self.heartbeat_ttl_secs
            )));
        }

        let message =
            heartbeat_message(&input.worker_id, input.monotonic_sequence, input.sampled_at_unix);
        verify_heartbeat_signature(&message, &input.signature, input.worker_address)?;

        let previous: Option<(i64,)> =
            sqlx::query_as("SELECT last_sequence FROM worker_health WHERE worker_id = $1")
                .bind(input.worker_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((last_sequence,)) = previous {
            if (input.monotonic_sequence as i64) <= last_sequence {
                return Err(AppError::Consistency(format!(
                    "heartbeat sequence {} does not advance past {}",
                    input.monotonic_sequence, last_sequence
                )));
            }
        }

        let health_score =
            WorkerHealth::derive_health_score(input.cpu_load, input.gpu_load, input.queue_depth);

        let sampled_at =
            chrono::DateTime::from_timestamp(input.sampled_at_unix, 0).unwrap_or_else(Utc::now);

        let health: WorkerHealth = sqlx::query_as(
            r#"
            INSERT INTO worker_health (
                worker_id, cpu_load, gpu_load, memory_used_bytes, memory_total_bytes,
                queue_depth, health_score, last_sequence, sampled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (worker_id) DO UPDATE SET
                cpu_load = EXCLUDED.cpu_load,
                gpu_load = EXCLUDED.gpu_load,
                memory_used_bytes = EXCLUDED.memory_used_bytes,
                memory_total_bytes = EXCLUDED.memory_total_bytes,
                queue_depth = EXCLUDED.queue_depth,
                health_score = EXCLUDED.health_score,
                last_sequence = EXCLUDED.last_sequence,
                sampled_at = EXCLUDED.sampled_at
            RETURNING worker_id, cpu_load, gpu_load, memory_used_bytes, memory_total_bytes,
                      queue_depth, health_score, last_sequence, sampled_at
            "#,
        )
        .bind(input.worker_id)
        .bind(input.cpu_load)
        .bind(input.gpu_load)
        .bind(input.memory_used_bytes)
        .bind(input.memory_total_bytes)
        .bind(input.queue_depth)
        .bind(health_score)
        .bind(input.monotonic_sequence as i64)
        .bind(sampled_at)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE workers SET last_heartbeat_at = $1 WHERE id = $2")
            .bind(sampled_at)
            .bind(input.worker_id)
            .execute(&self.pool)
            .await?;

        // First heartbeat after registration: flip Offline -> Idle. Never
        // overwrites Busy/Maintenance/Error — only a worker that hasn't
        // been handed any work yet is affected.
        sqlx::query("UPDATE workers SET status = $1 WHERE id = $2 AND status = $3")
            .bind(WorkerStatus::Idle)
            .bind(input.worker_id)
            .bind(WorkerStatus::Offline)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO worker_health_samples (worker_id, cpu_load, gpu_load, health_score, sampled_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(input.worker_id)
        .bind(input.cpu_load)
        .bind(input.gpu_load)
        .bind(health_score)
        .bind(sampled_at)
        .execute(&self.pool)
        .await?;

        self.bus.publish(CoordinatorEvent::HealthChanged {
            worker_id: input.worker_id,
            health_score,
        });

        tracing::info!(worker_id = %input.worker_id, health_score, "heartbeat accepted");

        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_score_prefers_low_load_and_shallow_queue() {
        let idle = WorkerHealth::derive_health_score(0.1, 0.1, 0);
        let busy = WorkerHealth::derive_health_score(0.9, 0.9, 80);
        assert!(idle > busy);
    }
}
