//! Pass-through read of the Event Store (§4.8, §6).

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use ciro_common::error::AppError;
use ciro_common::types::{ChainEvent, EventKind};
use ciro_indexer::event_store::PgEventStore;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/events", get(list_events))
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub contract: Option<String>,
    pub kind: Option<String>,
    pub from_block: u64,
    pub to_block: u64,
}

/// GET /v1/events?contract&kind&from_block&to_block — read-only, mirrors
/// `PgEventStore::read_range` directly rather than re-deriving its filters.
async fn list_events(
    State(state): State<AppState>,
    Query(q): Query<ListEventsQuery>,
) -> Result<Json<Vec<ChainEvent>>, AppError> {
    let kind = q
        .kind
        .as_deref()
        .map(parse_kind)
        .transpose()
        .map_err(AppError::Input)?;

    let store = PgEventStore::new(state.pool.clone());
    let events = store
        .read_range(q.contract.as_deref(), q.from_block, q.to_block, kind)
        .await?;
    Ok(Json(events))
}

fn parse_kind(raw: &str) -> Result<EventKind, String> {
    match raw {
        "job_submitted" => Ok(EventKind::JobSubmitted),
        "job_assigned" => Ok(EventKind::JobAssigned),
        "job_completed" => Ok(EventKind::JobCompleted),
        "job_failed" => Ok(EventKind::JobFailed),
        "job_cancelled" => Ok(EventKind::JobCancelled),
        "worker_registered" => Ok(EventKind::WorkerRegistered),
        "worker_slashed" => Ok(EventKind::WorkerSlashed),
        "stake_deposited" => Ok(EventKind::StakeDeposited),
        "stake_withdrawn" => Ok(EventKind::StakeWithdrawn),
        "cross_rollup_message" => Ok(EventKind::CrossRollupMessage),
        "undecodable" => Ok(EventKind::Undecodable),
        other => Err(format!("unknown event kind: {other}")),
    }
}
