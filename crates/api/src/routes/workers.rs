//! Worker registration, heartbeat ingestion, and administrative unban
//! (§4.5, §4.6, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ciro_common::error::AppError;
use ciro_common::types::Worker;
use ciro_coordinator::telemetry::HeartbeatInput;
use ciro_coordinator::workers::WorkerRegistry;

use crate::middleware::signature::AdminAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/workers", post(register_worker).get(list_workers))
        .route("/v1/workers/{id}", get(get_worker))
        .route("/v1/workers/{id}/heartbeat", post(heartbeat))
        .route("/v1/admin/workers/{id}/unban", post(unban_worker))
}

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub address: String,
    pub public_key: String,
    pub capabilities: Vec<String>,
    /// The worker's declared on-chain stake, checked against
    /// `AppConfig::min_stake_amount` before registration is attempted.
    pub stake_proof: f64,
}

/// POST /v1/workers — register by on-chain address. Rejects a stake proof
/// below the configured minimum before touching the database, and rejects
/// a second registration for an already-known address (409) rather than
/// silently refreshing it.
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<(StatusCode, Json<Worker>), AppError> {
    if req.stake_proof < state.config.min_stake_amount {
        return Err(AppError::Forbidden(format!(
            "stake proof {} is below the required minimum {}",
            req.stake_proof, state.config.min_stake_amount
        )));
    }

    let worker = WorkerRegistry::register(
        &state.pool,
        &req.address,
        &req.public_key,
        req.capabilities,
        req.stake_proof,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(worker)))
}

async fn get_worker(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Worker>, AppError> {
    let worker = WorkerRegistry::get(&state.pool, id).await?;
    Ok(Json(worker))
}

async fn list_workers(State(state): State<AppState>) -> Result<Json<Vec<Worker>>, AppError> {
    let workers = WorkerRegistry::list(&state.pool, None).await?;
    Ok(Json(workers))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub monotonic_sequence: u64,
    pub sampled_at_unix: i64,
    pub cpu_load: f64,
    pub gpu_load: f64,
    pub memory_used_bytes: i64,
    pub memory_total_bytes: i64,
    pub queue_depth: i32,
    /// Hex-encoded signature (with or without `0x` prefix) over
    /// `heartbeat_message(worker_id, monotonic_sequence, sampled_at_unix)`.
    pub signature: String,
}

/// POST /v1/workers/{id}/heartbeat — signed telemetry sample.
///
/// The signing address is the worker's own registered address, looked up
/// here rather than trusted from the request body, so a caller can't
/// impersonate another worker's signer.
async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<StatusCode, AppError> {
    let worker = WorkerRegistry::get(&state.pool, id).await?;
    let worker_address: alloy::primitives::Address = worker
        .address
        .parse()
        .map_err(|e| AppError::Input(format!("worker has an invalid stored address: {e}")))?;

    let signature = hex_decode(&req.signature)?;

    state
        .telemetry
        .ingest(HeartbeatInput {
            worker_id: id,
            worker_address,
            monotonic_sequence: req.monotonic_sequence,
            sampled_at_unix: req.sampled_at_unix,
            cpu_load: req.cpu_load,
            gpu_load: req.gpu_load,
            memory_used_bytes: req.memory_used_bytes,
            memory_total_bytes: req.memory_total_bytes,
            queue_depth: req.queue_depth,
            signature,
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct UnbanResponse {
    pub unbanned: bool,
}

/// POST /v1/admin/workers/{id}/unban — the only path back from a ban.
async fn unban_worker(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<UnbanResponse>, AppError> {
    state.reputation.unban(id).await?;
    Ok(Json(UnbanResponse { unbanned: true }))
}

/// Decode a hex-encoded string (with or without 0x prefix) into bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, AppError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if !hex.len().is_multiple_of(2) {
        return Err(AppError::Input("hex string must have even length".to_string()));
    }
    let bytes: Result<Vec<u8>, _> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect();
    bytes.map_err(|e| AppError::Input(format!("invalid hex signature: {e}")))
}
