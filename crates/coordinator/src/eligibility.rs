//! Job eligibility predicate (§4.6) — answers the question the Job
//! Distributor actually needs answered: can this worker be offered this
//! job at all? Eligibility gates participation; bid scoring (§4.7, see
//! `distributor::score_bids`) ranks the participants that pass this gate.

use chrono::Utc;

use ciro_common::types::{Worker, WorkerHealth, WorkerReputation, WorkerStatus};

/// Minimum health score a worker must report to be considered for new work.
const MIN_HEALTH_SCORE: f64 = 0.3;

/// A worker is eligible only if: it isn't banned, its reputation clears
/// `min_reputation`, its status is `Idle` or `Busy` (both count — a `Busy`
/// worker already running one task is still allowed into other auctions;
/// only `Offline`/`Maintenance`/`Error` exclude it), its last heartbeat is
/// within `heartbeat_ttl_secs`, and it's reporting a recent health sample
/// at or above `MIN_HEALTH_SCORE`. A missing health sample (no heartbeat
/// yet, or one stale enough that the Telemetry Sink never recorded it) is
/// treated as ineligible rather than defaulting open.
pub fn is_eligible(
    worker: &Worker,
    health: Option<&WorkerHealth>,
    reputation: &WorkerReputation,
    min_reputation: f64,
    heartbeat_ttl_secs: i64,
) -> bool {
    if reputation.is_banned {
        return false;
    }
    if reputation.score < min_reputation {
        return false;
    }
    if !matches!(worker.status, WorkerStatus::Idle | WorkerStatus::Busy) {
        return false;
    }
    let Some(last_heartbeat_at) = worker.last_heartbeat_at else {
        return false;
    };
    let age_secs = (Utc::now() - last_heartbeat_at).num_seconds();
    if age_secs > heartbeat_ttl_secs {
        return false;
    }
    match health {
        Some(h) => h.health_score >= MIN_HEALTH_SCORE,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    const TTL_SECS: i64 = 60;

    fn worker(status: WorkerStatus) -> Worker {
        Worker {
            id: Uuid::new_v4(),
            address: "0xabc".to_string(),
            public_key: "0xpubkey".to_string(),
            capabilities: vec!["gpu".to_string()],
            stake_amount: 10.0,
            status,
            registered_at: Utc::now(),
            last_heartbeat_at: Some(Utc::now()),
        }
    }

    fn reputation(score: f64, is_banned: bool) -> WorkerReputation {
        WorkerReputation {
            worker_id: Uuid::new_v4(),
            score,
            success_rate: 1.0,
            reliability: 1.0,
            efficiency: 1.0,
            consistency: 1.0,
            jobs_completed: 0,
            jobs_failed: 0,
            malicious_count: 0,
            is_banned,
            ban_reason: None,
            last_decay_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn health(score: f64) -> WorkerHealth {
        WorkerHealth {
            worker_id: Uuid::new_v4(),
            cpu_load: 0.1,
            gpu_load: 0.1,
            memory_used_bytes: 0,
            memory_total_bytes: 1,
            queue_depth: 0,
            health_score: score,
            last_sequence: 1,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn banned_worker_is_never_eligible() {
        let w = worker(WorkerStatus::Idle);
        assert!(!is_eligible(&w, Some(&health(1.0)), &reputation(1.0, true), 0.2, TTL_SECS));
    }

    #[test]
    fn low_reputation_is_ineligible() {
        let w = worker(WorkerStatus::Idle);
        assert!(!is_eligible(&w, Some(&health(1.0)), &reputation(0.1, false), 0.2, TTL_SECS));
    }

    #[test]
    fn missing_health_sample_is_ineligible() {
        let w = worker(WorkerStatus::Idle);
        assert!(!is_eligible(&w, None, &reputation(1.0, false), 0.2, TTL_SECS));
    }

    #[test]
    fn offline_worker_is_ineligible_even_if_well_reputed() {
        let w = worker(WorkerStatus::Offline);
        assert!(!is_eligible(&w, Some(&health(0.9)), &reputation(0.8, false), 0.2, TTL_SECS));
    }

    #[test]
    fn busy_worker_remains_eligible_for_new_auctions() {
        let w = worker(WorkerStatus::Busy);
        assert!(is_eligible(&w, Some(&health(0.9)), &reputation(0.8, false), 0.2, TTL_SECS));
    }

    #[test]
    fn stale_heartbeat_is_ineligible() {
        let mut w = worker(WorkerStatus::Idle);
        w.last_heartbeat_at = Some(Utc::now() - Duration::seconds(TTL_SECS + 1));
        assert!(!is_eligible(&w, Some(&health(0.9)), &reputation(0.8, false), 0.2, TTL_SECS));
    }

    #[test]
    fn idle_healthy_well_reputed_worker_is_eligible() {
        let w = worker(WorkerStatus::Idle);
        assert!(is_eligible(&w, Some(&health(0.9)), &reputation(0.8, false), 0.2, TTL_SECS));
    }
}
