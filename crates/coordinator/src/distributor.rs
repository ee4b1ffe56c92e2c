//! Job Distributor — submission, auction bidding, scoring, assignment, the
//! completion/failure lifecycle, the timeout path, and
//! refund-on-exhausted-retries (§4.7).
//!
//! Job/bid state is Postgres-durable; Redis holds only the ephemeral
//! "auction is open" marker, mirroring the inherited cooldown engine's
//! check-and-set idiom but keyed per-job with a TTL equal to the auction's
//! remaining open time instead of a fixed cooldown window.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use ciro_common::config::BidWeights;
use ciro_common::db::refresh_network_health;
use ciro_common::error::AppError;
use ciro_common::types::{Bid, Job, JobStatus, PenaltyKind, Task, TaskStatus, WorkerStatus};

use crate::bus::{CoordinatorEvent, EventBus};
use crate::reputation::ReputationEngine;
use crate::workers::WorkerRegistry;

pub struct JobDistributor {
    pool: PgPool,
    redis: Mutex<ConnectionManager>,
    bus: EventBus,
    weights: BidWeights,
    auction_duration_secs: i64,
    auction_max_bids: u32,
    job_max_retries: u32,
}

impl JobDistributor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        bus: EventBus,
        weights: BidWeights,
        auction_duration_secs: i64,
        auction_max_bids: u32,
        job_max_retries: u32,
    ) -> Self {
        Self {
            pool,
            redis: Mutex::new(redis),
            bus,
            weights,
            auction_duration_secs,
            auction_max_bids,
            job_max_retries,
        }
    }

    /// Submits a new job and opens its auction window.
    pub async fn submit_job(
        &self,
        submitter: &str,
        payload: serde_json::Value,
        deadline_at: Option<DateTime<Utc>>,
    ) -> Result<Job, AppError> {
        let job: Job = sqlx::query_as(
            r#"
            INSERT INTO jobs (id, submitter, status, retry_count, max_retries, payload, created_at, updated_at, deadline_at)
            VALUES ($1, $2, $3, 0, $4, $5, NOW(), NOW(), $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(submitter)
        .bind(JobStatus::Pending)
        .bind(self.job_max_retries as i32)
        .bind(&payload)
        .bind(deadline_at)
        .fetch_one(&self.pool)
        .await?;

        self.open_auction(job.id).await?;
        refresh_network_health(&self.pool).await;
        tracing::info!(job_id = %job.id, submitter, "job submitted, auction opened");
        Ok(job)
    }

    /// Marks the auction window open with a Redis TTL marker. The marker's
    /// mere presence is the "auction is open" fact, so clock skew between
    /// the distributor and its callers never matters.
    async fn open_auction(&self, job_id: Uuid) -> Result<(), AppError> {
        let key = Self::auction_key(job_id);
        let mut redis = self.redis.lock().await;
        let _: () = redis
            .set_ex(&key, "1", self.auction_duration_secs.max(1) as u64)
            .await?;
        Ok(())
    }

    pub async fn is_auction_open(&self, job_id: Uuid) -> Result<bool, AppError> {
        let key = Self::auction_key(job_id);
        let mut redis = self.redis.lock().await;
        let exists: bool = redis.exists(&key).await?;
        Ok(exists)
    }

    fn auction_key(job_id: Uuid) -> String {
        format!("auction:open:{job_id}")
    }

    /// Accepts a bid from a worker, provided the auction is still open and
    /// the bid cap hasn't been reached.
    pub async fn submit_bid(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        amount: f64,
        estimated_completion_secs: i64,
    ) -> Result<Bid, AppError> {
        if !self.is_auction_open(job_id).await? {
            return Err(AppError::Consistency(format!("auction for job {job_id} is closed")));
        }

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bids WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        if count.0 as u32 >= self.auction_max_bids {
            return Err(AppError::Consistency(format!("job {job_id} has reached its bid cap")));
        }

        let bid: Bid = sqlx::query_as(
            r#"
            INSERT INTO bids (id, job_id, worker_id, amount, estimated_completion_secs, submitted_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(worker_id)
        .bind(amount)
        .bind(estimated_completion_secs)
        .fetch_one(&self.pool)
        .await?;

        Ok(bid)
    }

    /// Scores every bid for a job with the literal weighted formula from
    /// §4.7 — `w_r·reputation + w_h·health + w_b/(bid_amount+1) +
    /// w_t/(estimated_completion_ms+1)` — and returns `(worker_id, score)`
    /// pairs sorted best-first.
    pub fn score_bids(&self, bids: &[Bid], reputations: &[f64], healths: &[f64]) -> Vec<(Uuid, f64)> {
        Self::score_bids_with_weights(&self.weights, bids, reputations, healths)
    }

    /// Pure scoring core, split out from `score_bids` so it can be unit
    /// tested without a live `PgPool`/`ConnectionManager`.
    fn score_bids_with_weights(
        weights: &BidWeights,
        bids: &[Bid],
        reputations: &[f64],
        healths: &[f64],
    ) -> Vec<(Uuid, f64)> {
        let mut scored: Vec<(Uuid, f64, f64, DateTime<Utc>)> = bids
            .iter()
            .enumerate()
            .map(|(i, bid)| {
                let reputation = reputations.get(i).copied().unwrap_or(0.0);
                let health = healths.get(i).copied().unwrap_or(0.0);
                let completion_ms = bid.estimated_completion_secs as f64 * 1000.0;
                let score = weights.reputation * reputation
                    + weights.health * health
                    + weights.bid_amount / (bid.amount + 1.0)
                    + weights.completion_time / (completion_ms + 1.0);
                (bid.worker_id, score, reputation, bid.submitted_at)
            })
            .collect();

        // Deterministic tie-break: higher score first, ties broken by
        // higher reputation, then earlier submission, then worker id, so
        // replaying the same auction always yields the same winner.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.3.cmp(&b.3))
                .then_with(|| a.0.cmp(&b.0))
        });

        scored.into_iter().map(|(id, score, _, _)| (id, score)).collect()
    }

    /// Closes the auction and assigns the job to the winning bidder in one
    /// transaction (job update + task insert), per the Persistence Layer's
    /// transaction-per-mutation style (§4.9), then frees the winner into
    /// `Busy` so it drops out of eligibility for other auctions' health
    /// checks that key off idleness metrics even though `Busy` workers
    /// remain auction-eligible.
    pub async fn assign_winner(&self, job_id: Uuid, winner_worker_id: Uuid) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE jobs SET status = $1, assigned_worker_id = $2, updated_at = NOW() WHERE id = $3 AND status = $4",
        )
        .bind(JobStatus::Assigned)
        .bind(winner_worker_id)
        .bind(job_id)
        .bind(JobStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Consistency(format!("job {job_id} is not pending, cannot assign")));
        }

        let task: Task = sqlx::query_as(
            r#"
            INSERT INTO tasks (id, job_id, status, dependencies, retry_count, assigned_worker_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(TaskStatus::Assigned)
        .bind(Vec::<Uuid>::new())
        .bind(winner_worker_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        WorkerRegistry::set_status(&self.pool, winner_worker_id, WorkerStatus::Busy).await?;
        refresh_network_health(&self.pool).await;

        self.bus.publish(CoordinatorEvent::JobAssigned {
            job_id,
            worker_id: winner_worker_id,
        });
        tracing::info!(job_id = %job_id, worker_id = %winner_worker_id, "job assigned");

        Ok(task)
    }

    /// Called when a worker reports it has started work on an assigned
    /// task (§4.7's job/task lifecycle: `Assigned` -> `Processing`).
    pub async fn start_task(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tasks SET status = $1, updated_at = NOW() WHERE id = $2 AND assigned_worker_id = $3 AND status = $4",
        )
        .bind(TaskStatus::Processing)
        .bind(task_id)
        .bind(worker_id)
        .bind(TaskStatus::Assigned)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Consistency(format!(
                "task {task_id} is not assigned to worker {worker_id}"
            )));
        }

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3")
            .bind(JobStatus::Processing)
            .bind(task.job_id)
            .bind(JobStatus::Assigned)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        refresh_network_health(&self.pool).await;
        Ok(task)
    }

    /// Called when a worker reports a task finished successfully. Once
    /// every task belonging to the job has reached a terminal state, the
    /// job itself completes, the worker is freed back to `Idle`, and the
    /// Reputation Engine records the success.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        result: serde_json::Value,
        reputation: &ReputationEngine,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tasks SET status = $1, updated_at = NOW() WHERE id = $2 AND assigned_worker_id = $3 AND status = $4",
        )
        .bind(TaskStatus::Completed)
        .bind(task_id)
        .bind(worker_id)
        .bind(TaskStatus::Processing)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Consistency(format!(
                "task {task_id} is not processing for worker {worker_id}"
            )));
        }

        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&mut *tx)
            .await?;

        let remaining: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE job_id = $1 AND status NOT IN ($2, $3)",
        )
        .bind(task.job_id)
        .bind(TaskStatus::Completed)
        .bind(TaskStatus::Failed)
        .fetch_one(&mut *tx)
        .await?;

        let job_completed = remaining.0 == 0;
        if job_completed {
            sqlx::query("UPDATE jobs SET status = $1, result = $2, updated_at = NOW() WHERE id = $3")
                .bind(JobStatus::Completed)
                .bind(&result)
                .bind(task.job_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        WorkerRegistry::set_status(&self.pool, worker_id, WorkerStatus::Idle).await?;
        refresh_network_health(&self.pool).await;

        if job_completed {
            reputation.record_success(worker_id).await?;
            self.bus.publish(CoordinatorEvent::JobCompleted {
                job_id: task.job_id,
                worker_id,
            });
            tracing::info!(job_id = %task.job_id, worker_id = %worker_id, "job completed");
        }

        Ok(())
    }

    /// Called when a worker reports a task failed. Penalizes and records
    /// the failure against the worker's reputation, frees the worker, and
    /// hands the job to `retry_or_refund` to decide whether it gets
    /// re-auctioned or refunded.
    pub async fn fail_task(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        reason: &str,
        reputation: &ReputationEngine,
    ) -> Result<(), AppError> {
        let task: Task = sqlx::query_as(
            "UPDATE tasks SET status = $1, updated_at = NOW() WHERE id = $2 AND assigned_worker_id = $3 RETURNING *",
        )
        .bind(TaskStatus::Failed)
        .bind(task_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Consistency(format!("task {task_id} is not assigned to worker {worker_id}")))?;

        WorkerRegistry::set_status(&self.pool, worker_id, WorkerStatus::Idle).await?;

        reputation
            .apply_penalty(worker_id, PenaltyKind::JobFailure, reason, Some(task.job_id))
            .await?;
        reputation.record_failure(worker_id).await?;

        self.bus.publish(CoordinatorEvent::JobFailed {
            job_id: task.job_id,
            worker_id,
        });
        tracing::warn!(job_id = %task.job_id, task_id = %task_id, worker_id = %worker_id, reason, "task failed");

        self.retry_or_refund(task.job_id).await
    }

    /// Called when a job's auction closed with no winner, or an assignment
    /// subsequently timed out. Retries up to `max_retries`, then marks the
    /// job failed and publishes a refund fact — actual on-chain refund
    /// submission belongs to whichever binary holds the RPC Adapter, since
    /// the distributor itself never holds chain keys (Design Notes §9).
    /// Either branch frees a previously assigned worker back to `Idle`.
    pub async fn retry_or_refund(&self, job_id: Uuid) -> Result<(), AppError> {
        let job: Job = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if job.retry_count < job.max_retries {
            sqlx::query(
                "UPDATE jobs SET status = $1, retry_count = retry_count + 1, assigned_worker_id = NULL, updated_at = NOW() WHERE id = $2",
            )
            .bind(JobStatus::Pending)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            self.open_auction(job_id).await?;
            tracing::info!(job_id = %job_id, retry_count = job.retry_count + 1, "job re-opened for auction after retry");
        } else {
            sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(JobStatus::Failed)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            tracing::warn!(job_id = %job_id, submitter = %job.submitter, "job exhausted retries, refund required");
            self.bus.publish(CoordinatorEvent::RefundRequired {
                job_id,
                submitter: job.submitter,
            });
        }

        if let Some(worker_id) = job.assigned_worker_id {
            WorkerRegistry::set_status(&self.pool, worker_id, WorkerStatus::Idle).await?;
        }
        refresh_network_health(&self.pool).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(worker_id: Uuid, amount: f64, completion_secs: i64, submitted_at: DateTime<Utc>) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            worker_id,
            amount,
            estimated_completion_secs: completion_secs,
            score: None,
            submitted_at,
        }
    }

    #[test]
    fn tie_break_is_deterministic_by_reputation_then_submission_then_worker_id() {
        let w_a = Uuid::from_u128(1);
        let w_b = Uuid::from_u128(2);
        let now = Utc::now();

        // Identical bid economics for both workers — the tie-break must
        // fall through to reputation, then submission time, then worker id.
        let bids = vec![bid(w_a, 10.0, 100, now), bid(w_b, 10.0, 100, now)];
        let reputations = vec![0.5, 0.9];
        let healths = vec![1.0, 1.0];
        let weights = BidWeights {
            reputation: 1.0,
            health: 0.0,
            bid_amount: 0.0,
            completion_time: 0.0,
        };

        let scored = JobDistributor::score_bids_with_weights(&weights, &bids, &reputations, &healths);
        assert_eq!(scored[0].0, w_b, "higher reputation must win when bid economics tie");
    }

    #[test]
    fn score_bids_rewards_lower_amount_and_faster_completion() {
        let w_a = Uuid::from_u128(1);
        let w_b = Uuid::from_u128(2);
        let now = Utc::now();

        let bids = vec![bid(w_a, 100.0, 600, now), bid(w_b, 1.0, 10, now)];
        let reputations = vec![0.5, 0.5];
        let healths = vec![0.5, 0.5];
        let weights = BidWeights::default();

        let scored = JobDistributor::score_bids_with_weights(&weights, &bids, &reputations, &healths);
        assert_eq!(scored[0].0, w_b, "cheaper, faster bid should score higher when reputation/health tie");
    }
}
