//! Job submission, bidding and status routes (§4.8, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ciro_common::error::AppError;
use ciro_common::types::{Bid, Job, Task};
use ciro_coordinator::jobs::JobQueries;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/jobs", post(submit_job).get(list_jobs))
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/jobs/{id}/bids", post(submit_bid).get(list_bids))
        .route("/v1/jobs/{id}/tasks", get(list_tasks))
        .route("/v1/jobs/{id}/tasks/{task_id}/start", post(start_task))
        .route("/v1/jobs/{id}/tasks/{task_id}/complete", post(complete_task))
        .route("/v1/jobs/{id}/tasks/{task_id}/fail", post(fail_task))
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub submitter: String,
    pub payload: serde_json::Value,
    pub deadline_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

/// POST /v1/jobs — submit a job and open its auction window.
async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, AppError> {
    let job = state
        .distributor
        .submit_job(&req.submitter, req.payload, req.deadline_at)
        .await?;
    Ok(Json(SubmitJobResponse { job_id: job.id }))
}

/// GET /v1/jobs/{id} — status + result when available.
async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Job>, AppError> {
    let job = JobQueries::get(&state.pool, id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub submitter: Option<String>,
}

async fn list_jobs(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = JobQueries::list(&state.pool, q.submitter.as_deref()).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct SubmitBidRequest {
    pub worker_id: Uuid,
    pub amount: f64,
    pub estimated_completion_secs: i64,
}

/// POST /v1/jobs/{id}/bids — a worker bids into an open auction.
async fn submit_bid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitBidRequest>,
) -> Result<Json<Bid>, AppError> {
    let bid = state
        .distributor
        .submit_bid(id, req.worker_id, req.amount, req.estimated_completion_secs)
        .await?;
    Ok(Json(bid))
}

async fn list_bids(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Bid>>, AppError> {
    let bids = JobQueries::bids_for_job(&state.pool, id).await?;
    Ok(Json(bids))
}

async fn list_tasks(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = JobQueries::tasks_for_job(&state.pool, id).await?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
pub struct StartTaskRequest {
    pub worker_id: Uuid,
}

/// POST /v1/jobs/{id}/tasks/{task_id}/start — a worker reports it has
/// begun processing its assigned task.
async fn start_task(
    State(state): State<AppState>,
    Path((_job_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StartTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = state.distributor.start_task(task_id, req.worker_id).await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    pub worker_id: Uuid,
    pub result: serde_json::Value,
}

/// POST /v1/jobs/{id}/tasks/{task_id}/complete — a worker reports
/// successful completion; the job itself completes once every task for it
/// has reached a terminal state.
async fn complete_task(
    State(state): State<AppState>,
    Path((_job_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<StatusCode, AppError> {
    state
        .distributor
        .complete_task(task_id, req.worker_id, req.result, &state.reputation)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FailTaskRequest {
    pub worker_id: Uuid,
    pub reason: String,
}

/// POST /v1/jobs/{id}/tasks/{task_id}/fail — a worker reports failure;
/// penalizes the worker and re-auctions or refunds the job.
async fn fail_task(
    State(state): State<AppState>,
    Path((_job_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<FailTaskRequest>,
) -> Result<StatusCode, AppError> {
    state
        .distributor
        .fail_task(task_id, req.worker_id, &req.reason, &state.reputation)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
