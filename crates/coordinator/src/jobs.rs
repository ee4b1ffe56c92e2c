//! Job/task/bid query helpers for the Coordinator Facade's read endpoints
//! (§4.8). Mutating job state during an auction lives in `distributor.rs`;
//! this module is read-only.

use sqlx::PgPool;
use uuid::Uuid;

use ciro_common::error::AppError;
use ciro_common::types::{Bid, Job, Task};

pub struct JobQueries;

impl JobQueries {
    pub async fn get(pool: &PgPool, job_id: Uuid) -> Result<Job, AppError> {
        sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))
    }

    pub async fn list(pool: &PgPool, submitter: Option<&str>) -> Result<Vec<Job>, AppError> {
        let jobs: Vec<Job> = sqlx::query_as(
            "SELECT * FROM jobs WHERE ($1::text IS NULL OR submitter = $1) ORDER BY created_at DESC",
        )
        .bind(submitter)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    pub async fn tasks_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<Task>, AppError> {
        let tasks: Vec<Task> = sqlx::query_as("SELECT * FROM tasks WHERE job_id = $1 ORDER BY created_at")
            .bind(job_id)
            .fetch_all(pool)
            .await?;
        Ok(tasks)
    }

    pub async fn bids_for_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<Bid>, AppError> {
        let bids: Vec<Bid> = sqlx::query_as("SELECT * FROM bids WHERE job_id = $1 ORDER BY submitted_at")
            .bind(job_id)
            .fetch_all(pool)
            .await?;
        Ok(bids)
    }
}
