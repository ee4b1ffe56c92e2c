//! Aggregated network health (§4.8, §6, §10).
//!
//! Backed by the `network_health_mv` materialized view rather than
//! recomputing aggregates per request — the view is refreshed after every
//! event batch append and reputation mutation (§10).

use axum::extract::State;
use axum::{Json, Router};
use axum::routing::get;
use serde::Serialize;

use ciro_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/network/health", get(network_health))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct NetworkHealth {
    active_workers: i64,
    banned_workers: i64,
    pending_jobs: i64,
    assigned_jobs: i64,
    failed_jobs_last_hour: i64,
    average_reputation: f64,
}

/// GET /v1/network/health — aggregated metrics.
async fn network_health(State(state): State<AppState>) -> Result<Json<NetworkHealth>, AppError> {
    let row: NetworkHealth = sqlx::query_as("SELECT * FROM network_health_mv")
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(row))
}
