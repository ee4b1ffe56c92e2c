//! Reputation Engine — weighted composite scoring, decay, and the penalty
//! taxonomy (§4.6).

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use ciro_common::config::{PenaltySeverities, ReputationWeights};
use ciro_common::db::refresh_network_health;
use ciro_common::error::AppError;
use ciro_common::types::{PenaltyKind, TaskStatus, WorkerReputation};

use crate::bus::{CoordinatorEvent, EventBus};

pub struct ReputationEngine {
    pool: PgPool,
    redis: Mutex<ConnectionManager>,
    bus: EventBus,
    weights: ReputationWeights,
    severities: PenaltySeverities,
    success_multiplier: f64,
    failure_multiplier: f64,
    max_score: f64,
    min_reputation: f64,
    decay_interval_secs: i64,
    decay_rate: f64,
    auto_ban_threshold: u32,
    auto_ban_enabled: bool,
    /// Trailing sample count read by `compute_reliability`/`compute_efficiency`.
    reliability_window: i64,
    /// A `worker_health_samples` row counts toward `reliability` only if its
    /// `health_score` is at or above this threshold.
    healthy_health_score_threshold: f64,
    /// Trailing completed-task count read by `compute_consistency`.
    consistency_window: i64,
}

impl ReputationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        bus: EventBus,
        weights: ReputationWeights,
        severities: PenaltySeverities,
        success_multiplier: f64,
        failure_multiplier: f64,
        max_score: f64,
        min_reputation: f64,
        decay_interval_secs: i64,
        decay_rate: f64,
        auto_ban_threshold: u32,
        auto_ban_enabled: bool,
        reliability_window: i64,
        healthy_health_score_threshold: f64,
        consistency_window: i64,
    ) -> Self {
        Self {
            pool,
            redis: Mutex::new(redis),
            bus,
            weights,
            severities,
            success_multiplier,
            failure_multiplier,
            max_score,
            min_reputation,
            decay_interval_secs,
            decay_rate,
            auto_ban_threshold,
            auto_ban_enabled,
            reliability_window,
            healthy_health_score_threshold,
            consistency_window,
        }
    }

    pub fn min_reputation(&self) -> f64 {
        self.min_reputation
    }

    /// Composite score from the four weighted components (§4.6).
    fn composite(&self, rep: &WorkerReputation) -> f64 {
        (self.weights.success * rep.success_rate
            + self.weights.reliability * rep.reliability
            + self.weights.efficiency * rep.efficiency
            + self.weights.consistency * rep.consistency)
            .clamp(0.0, self.max_score)
    }

    /// Recomputes all four components from the worker's actual counters and
    /// telemetry/task history, so the composite score reflects real
    /// behavior rather than a value carried over unchanged since
    /// registration.
    async fn recompute_components(&self, rep: &mut WorkerReputation) -> Result<(), AppError> {
        let total = (rep.jobs_completed + rep.jobs_failed).max(1) as f64;
        rep.success_rate = (rep.jobs_completed as f64 / total).clamp(0.0, 1.0);
        rep.reliability = self.compute_reliability(rep.worker_id).await?;
        rep.efficiency = self.compute_efficiency(rep.worker_id).await?;
        rep.consistency = self.compute_consistency(rep.worker_id).await?;
        Ok(())
    }

    /// Fraction of the last `reliability_window` heartbeat samples whose
    /// `health_score` cleared `healthy_health_score_threshold`. Defaults to
    /// `1.0` for a worker with no samples yet, rather than penalizing it
    /// for telemetry it hasn't had a chance to send.
    async fn compute_reliability(&self, worker_id: Uuid) -> Result<f64, AppError> {
        let samples: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT health_score FROM worker_health_samples
            WHERE worker_id = $1
            ORDER BY sampled_at DESC
            LIMIT $2
            "#,
        )
        .bind(worker_id)
        .bind(self.reliability_window)
        .fetch_all(&self.pool)
        .await?;

        if samples.is_empty() {
            return Ok(1.0);
        }

        let healthy = samples
            .iter()
            .filter(|(score,)| *score >= self.healthy_health_score_threshold)
            .count();
        Ok(healthy as f64 / samples.len() as f64)
    }

    /// Mean load headroom across the last `reliability_window` samples:
    /// `1.0` is an idle worker, `0.0` is pegged.
    async fn compute_efficiency(&self, worker_id: Uuid) -> Result<f64, AppError> {
        let samples: Vec<(f64, f64)> = sqlx::query_as(
            r#"
            SELECT cpu_load, gpu_load FROM worker_health_samples
            WHERE worker_id = $1
            ORDER BY sampled_at DESC
            LIMIT $2
            "#,
        )
        .bind(worker_id)
        .bind(self.reliability_window)
        .fetch_all(&self.pool)
        .await?;

        if samples.is_empty() {
            return Ok(1.0);
        }

        let mean_load: f64 = samples.iter().map(|(cpu, gpu)| (cpu + gpu) / 2.0).sum::<f64>()
            / samples.len() as f64;
        Ok((1.0 - mean_load).clamp(0.0, 1.0))
    }

    /// `1.0` minus the coefficient of variation of the worker's last
    /// `consistency_window` completed-task durations: a worker that
    /// finishes in roughly the same time every task scores near `1.0`, one
    /// whose completion time swings wildly scores lower. Defaults to `1.0`
    /// with fewer than two samples, since variation isn't meaningful yet.
    async fn compute_consistency(&self, worker_id: Uuid) -> Result<f64, AppError> {
        let durations: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT EXTRACT(EPOCH FROM (updated_at - created_at))
            FROM tasks
            WHERE assigned_worker_id = $1 AND status = $2
            ORDER BY updated_at DESC
            LIMIT $3
            "#,
        )
        .bind(worker_id)
        .bind(TaskStatus::Completed)
        .bind(self.consistency_window)
        .fetch_all(&self.pool)
        .await?;

        if durations.len() < 2 {
            return Ok(1.0);
        }

        let values: Vec<f64> = durations.into_iter().map(|(secs,)| secs).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if mean <= 0.0 {
            return Ok(1.0);
        }

        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let coefficient_of_variation = variance.sqrt() / mean;
        Ok((1.0 - coefficient_of_variation.min(1.0)).clamp(0.0, 1.0))
    }

    /// Records a job completion, recomputes all four components from real
    /// counters/telemetry/task history, then applies the success
    /// multiplier to the resulting composite score (not to a single input
    /// factor — §4.6 describes the multiplier as acting on the score).
    pub async fn record_success(&self, worker_id: Uuid) -> Result<WorkerReputation, AppError> {
        let mut rep = self.load_or_init(worker_id).await?;
        rep.jobs_completed += 1;
        self.recompute_components(&mut rep).await?;
        rep.score = (self.composite(&rep) * self.success_multiplier).clamp(0.0, self.max_score);
        let updated = self.persist(&rep).await?;
        refresh_network_health(&self.pool).await;
        self.bus.publish(CoordinatorEvent::ReputationChanged {
            worker_id,
            score: updated.score,
        });
        Ok(updated)
    }

    /// Records a job failure with no associated penalty kind (e.g. a retry
    /// the watchdog already penalized separately as a timeout).
    pub async fn record_failure(&self, worker_id: Uuid) -> Result<WorkerReputation, AppError> {
        let mut rep = self.load_or_init(worker_id).await?;
        rep.jobs_failed += 1;
        self.recompute_components(&mut rep).await?;
        rep.score = (self.composite(&rep) * self.failure_multiplier).clamp(0.0, self.max_score);
        let updated = self.persist(&rep).await?;
        refresh_network_health(&self.pool).await;
        self.bus.publish(CoordinatorEvent::ReputationChanged {
            worker_id,
            score: updated.score,
        });
        Ok(updated)
    }

    /// Applies a penalty of the given kind, multiplying the score down by
    /// `(1 - severity)`, and bans the worker once `malicious_count` — which
    /// only `PenaltyKind::MaliciousBehavior` increments — crosses
    /// `auto_ban_threshold`. A ban is reversible only by an administrative
    /// `unban` call (§4.6); it is never cleared by an unrelated success or
    /// by a penalty of a different kind.
    pub async fn apply_penalty(
        &self,
        worker_id: Uuid,
        kind: PenaltyKind,
        reason: &str,
        job_id: Option<Uuid>,
    ) -> Result<WorkerReputation, AppError> {
        let severity = self.severities.severity_for(kind);
        let mut rep = self.load_or_init(worker_id).await?;
        rep.score = (rep.score * (1.0 - severity)).clamp(0.0, self.max_score);
        if kind == PenaltyKind::MaliciousBehavior {
            rep.malicious_count += 1;
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO penalties (id, worker_id, kind, severity, reason, job_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(worker_id)
        .bind(kind)
        .bind(severity)
        .bind(reason)
        .bind(job_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let should_ban = self.auto_ban_enabled
            && kind == PenaltyKind::MaliciousBehavior
            && (rep.malicious_count as u32) >= self.auto_ban_threshold;
        if should_ban {
            rep.is_banned = true;
            rep.ban_reason = Some(reason.to_string());
        }

        let updated = Self::persist_tx(&mut tx, &rep).await?;
        tx.commit().await?;
        refresh_network_health(&self.pool).await;

        self.bus.publish(CoordinatorEvent::ReputationChanged {
            worker_id,
            score: updated.score,
        });
        if should_ban {
            tracing::warn!(worker_id = %worker_id, malicious_count = rep.malicious_count, "worker auto-banned after repeated malicious behavior");
            self.bus.publish(CoordinatorEvent::WorkerBanned { worker_id });
        }

        Ok(updated)
    }

    /// Administrative unban — the only path back from `is_banned = true`.
    /// Clears `malicious_count` along with the ban itself, since the ban's
    /// entire purpose was to act on that count.
    pub async fn unban(&self, worker_id: Uuid) -> Result<(), AppError> {
        let mut rep = self.load_or_init(worker_id).await?;
        rep.is_banned = false;
        rep.ban_reason = None;
        rep.malicious_count = 0;

        self.persist(&rep).await?;
        refresh_network_health(&self.pool).await;

        self.bus.publish(CoordinatorEvent::WorkerUnbanned { worker_id });
        tracing::info!(worker_id = %worker_id, "worker unbanned by administrative action");
        Ok(())
    }

    /// Applies decay to every worker whose `decay_interval` has elapsed,
    /// gated per worker by a Redis TTL marker so a crashed-and-restarted
    /// ticker never double-applies decay within one interval — the same
    /// check-and-set idiom the inherited cooldown engine used for alert
    /// suppression, keyed per-worker instead of per-subscription. Banned
    /// workers are skipped: their score is frozen until an administrator
    /// reverses the ban.
    pub async fn tick_decay(&self) -> Result<u32, AppError> {
        let rows: Vec<(Uuid, bool)> =
            sqlx::query_as("SELECT worker_id, is_banned FROM worker_reputation")
                .fetch_all(&self.pool)
                .await?;

        let mut decayed = 0u32;
        for (worker_id, is_banned) in rows {
            if is_banned {
                continue;
            }

            let key = format!("reputation:decay:{worker_id}");
            let set: Option<String> = {
                let mut redis = self.redis.lock().await;
                redis::cmd("SET")
                    .arg(&key)
                    .arg("1")
                    .arg("NX")
                    .arg("EX")
                    .arg(self.decay_interval_secs)
                    .query_async(&mut *redis)
                    .await?
            };
            if set.is_none() {
                continue;
            }

            let mut rep = self.load_or_init(worker_id).await?;
            rep.score = (rep.score * (1.0 - self.decay_rate)).clamp(0.0, self.max_score);
            rep.last_decay_at = Utc::now();
            self.persist(&rep).await?;
            decayed += 1;
        }

        if decayed > 0 {
            refresh_network_health(&self.pool).await;
        }

        Ok(decayed)
    }

    async fn load_or_init(&self, worker_id: Uuid) -> Result<WorkerReputation, AppError> {
        let existing: Option<WorkerReputation> =
            sqlx::query_as("SELECT * FROM worker_reputation WHERE worker_id = $1")
                .bind(worker_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(rep) = existing {
            return Ok(rep);
        }

        let now = Utc::now();
        Ok(WorkerReputation {
            worker_id,
            score: self.max_score,
            success_rate: 1.0,
            reliability: 1.0,
            efficiency: 1.0,
            consistency: 1.0,
            jobs_completed: 0,
            jobs_failed: 0,
            malicious_count: 0,
            is_banned: false,
            ban_reason: None,
            last_decay_at: now,
            updated_at: now,
        })
    }

    async fn persist(&self, rep: &WorkerReputation) -> Result<WorkerReputation, AppError> {
        let mut tx = self.pool.begin().await?;
        let result = Self::persist_tx(&mut tx, rep).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn persist_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        rep: &WorkerReputation,
    ) -> Result<WorkerReputation, AppError> {
        let updated: WorkerReputation = sqlx::query_as(
            r#"
            INSERT INTO worker_reputation (
                worker_id, score, success_rate, reliability, efficiency, consistency,
                jobs_completed, jobs_failed, malicious_count, is_banned, ban_reason,
                last_decay_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (worker_id) DO UPDATE SET
                score = EXCLUDED.score,
                success_rate = EXCLUDED.success_rate,
                reliability = EXCLUDED.reliability,
                efficiency = EXCLUDED.efficiency,
                consistency = EXCLUDED.consistency,
                jobs_completed = EXCLUDED.jobs_completed,
                jobs_failed = EXCLUDED.jobs_failed,
                malicious_count = EXCLUDED.malicious_count,
                is_banned = EXCLUDED.is_banned,
                ban_reason = EXCLUDED.ban_reason,
                last_decay_at = EXCLUDED.last_decay_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(rep.worker_id)
        .bind(rep.score)
        .bind(rep.success_rate)
        .bind(rep.reliability)
        .bind(rep.efficiency)
        .bind(rep.consistency)
        .bind(rep.jobs_completed)
        .bind(rep.jobs_failed)
        .bind(rep.malicious_count)
        .bind(rep.is_banned)
        .bind(&rep.ban_reason)
        .bind(rep.last_decay_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_are_normalized() {
        assert!(ReputationWeights::default().is_normalized());
    }

    #[test]
    fn composite_of_perfect_reputation_is_one() {
        let w = ReputationWeights::default();
        let rep = WorkerReputation {
            worker_id: Uuid::new_v4(),
            score: 0.0,
            success_rate: 1.0,
            reliability: 1.0,
            efficiency: 1.0,
            consistency: 1.0,
            jobs_completed: 10,
            jobs_failed: 0,
            malicious_count: 0,
            is_banned: false,
            ban_reason: None,
            last_decay_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let composite = w.success * rep.success_rate
            + w.reliability * rep.reliability
            + w.efficiency * rep.efficiency
            + w.consistency * rep.consistency;
        assert!((composite - 1.0).abs() < 1e-9);
    }
}
