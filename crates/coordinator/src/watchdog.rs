//! Deadline-breach watchdog (§4.6/§4.7). A single ticker task scans for
//! jobs whose `deadline_at` has passed without completion, rather than one
//! timer per job — same shape as the inherited alert-fatigue cooldown
//! idiom (a stateful scan gating a downstream action), different subject.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use ciro_common::error::AppError;
use ciro_common::types::{Job, PenaltyKind};

use crate::bus::{CoordinatorEvent, EventBus};
use crate::distributor::JobDistributor;
use crate::reputation::ReputationEngine;

pub struct Watchdog {
    pool: PgPool,
    bus: EventBus,
    distributor: Arc<JobDistributor>,
}

impl Watchdog {
    pub fn new(pool: PgPool, bus: EventBus, distributor: Arc<JobDistributor>) -> Self {
        Self { pool, bus, distributor }
    }

    /// Finds jobs assigned/processing past their deadline, penalizes the
    /// assigned worker, and hands the job to `retry_or_refund` so it's
    /// re-auctioned (if retries remain) or refunded, rather than
    /// unconditionally marking it failed. Returns the ids it flagged.
    pub async fn scan_deadline_breaches(
        &self,
        reputation: &ReputationEngine,
    ) -> Result<Vec<Uuid>, AppError> {
        let breached: Vec<Job> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('assigned', 'processing')
              AND deadline_at IS NOT NULL
              AND deadline_at < NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut flagged = Vec::with_capacity(breached.len());
        for job in breached {
            if let Some(worker_id) = job.assigned_worker_id {
                reputation
                    .apply_penalty(worker_id, PenaltyKind::JobTimeout, "job deadline exceeded", Some(job.id))
                    .await?;
            }

            tracing::warn!(job_id = %job.id, "job deadline breached");
            self.bus.publish(CoordinatorEvent::JobTimedOut { job_id: job.id });
            self.distributor.retry_or_refund(job.id).await?;
            flagged.push(job.id);
        }

        Ok(flagged)
    }

    /// Runs `scan_deadline_breaches` on a fixed interval until the process
    /// exits. One task for the whole job pool, per the Concurrency Model
    /// (§5) — not one timer per job.
    pub async fn run(self, reputation: Arc<ReputationEngine>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.scan_deadline_breaches(&reputation).await {
                tracing::error!(error = %e, "watchdog scan failed");
            }
        }
    }
}
