//! Worker registry CRUD (§4.9) — mirrors the inherited subscription
//! service's shape: plain functions taking a pool, no hidden state, a
//! transaction only where a mutation needs one.

use sqlx::PgPool;
use uuid::Uuid;

use ciro_common::db::refresh_network_health;
use ciro_common::error::AppError;
use ciro_common::types::{Worker, WorkerStatus};

pub struct WorkerRegistry;

impl WorkerRegistry {
    /// Registers a worker by on-chain address. Unlike a typical upsert, a
    /// second registration for an already-known address is rejected rather
    /// than silently refreshed — re-registration would let a worker reset
    /// its declared capabilities/stake without going through `unban` or a
    /// deliberate re-registration flow.
    pub async fn register(
        pool: &PgPool,
        address: &str,
        public_key: &str,
        capabilities: Vec<String>,
        stake_amount: f64,
    ) -> Result<Worker, AppError> {
        let worker: Option<Worker> = sqlx::query_as(
            r#"
            INSERT INTO workers (id, address, public_key, capabilities, stake_amount, status, registered_at, last_heartbeat_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NULL)
            ON CONFLICT (address) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(address)
        .bind(public_key)
        .bind(&capabilities)
        .bind(stake_amount)
        .bind(WorkerStatus::Offline)
        .fetch_optional(pool)
        .await?;

        let worker = worker
            .ok_or_else(|| AppError::Consistency(format!("worker with address {address} is already registered")))?;

        refresh_network_health(pool).await;
        tracing::info!(worker_id = %worker.id, address, "worker registered");
        Ok(worker)
    }

    pub async fn get(pool: &PgPool, worker_id: Uuid) -> Result<Worker, AppError> {
        sqlx::query_as("SELECT * FROM workers WHERE id = $1")
            .bind(worker_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))
    }

    pub async fn get_by_address(pool: &PgPool, address: &str) -> Result<Worker, AppError> {
        sqlx::query_as("SELECT * FROM workers WHERE address = $1")
            .bind(address)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker with address {address} not found")))
    }

    pub async fn list(pool: &PgPool, status: Option<WorkerStatus>) -> Result<Vec<Worker>, AppError> {
        let workers: Vec<Worker> = sqlx::query_as(
            "SELECT * FROM workers WHERE ($1::text IS NULL OR status = $1) ORDER BY registered_at DESC",
        )
        .bind(status)
        .fetch_all(pool)
        .await?;
        Ok(workers)
    }

    pub async fn set_status(pool: &PgPool, worker_id: Uuid, status: WorkerStatus) -> Result<Worker, AppError> {
        let worker = sqlx::query_as("UPDATE workers SET status = $1 WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(worker_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))?;
        refresh_network_health(pool).await;
        Ok(worker)
    }
}
