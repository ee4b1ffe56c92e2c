//! Integration tests for the Job Distributor, Reputation Engine, and
//! Worker Registry.
//!
//! Requires a running PostgreSQL and Redis instance:
//!
//! ```bash
//! DATABASE_URL="postgresql://..." REDIS_URL="redis://localhost:6379" \
//!   cargo test -p ciro-coordinator --test integration -- --ignored --nocapture
//! ```

use sqlx::PgPool;

use ciro_common::config::{BidWeights, PenaltySeverities, ReputationWeights};
use ciro_common::redis_pool::create_redis_pool;
use ciro_common::types::{JobStatus, PenaltyKind, WorkerStatus};
use ciro_coordinator::bus::EventBus;
use ciro_coordinator::distributor::JobDistributor;
use ciro_coordinator::jobs::JobQueries;
use ciro_coordinator::reputation::ReputationEngine;
use ciro_coordinator::workers::WorkerRegistry;

async fn setup(pool: &PgPool) {
    sqlx::migrate!("../../migrations").run(pool).await.unwrap();

    sqlx::query("DELETE FROM penalties").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM bids").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM tasks").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM jobs").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM worker_reputation").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM worker_health").execute(pool).await.unwrap();
    sqlx::query("DELETE FROM workers").execute(pool).await.unwrap();
}

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[sqlx::test]
#[ignore]
async fn worker_registration_rejects_duplicate_address(pool: PgPool) {
    setup(&pool).await;

    let first = WorkerRegistry::register(&pool, "0xworker1", "0xpubkey1", vec!["cuda".to_string()], 100.0)
        .await
        .unwrap();
    assert_eq!(first.status, WorkerStatus::Offline);

    let second = WorkerRegistry::register(&pool, "0xworker1", "0xpubkey1", vec!["cuda".to_string()], 100.0).await;
    assert!(second.is_err());
}

#[sqlx::test]
#[ignore]
async fn auction_assigns_highest_scoring_bidder(pool: PgPool) {
    setup(&pool).await;
    let redis = create_redis_pool(&redis_url()).await.unwrap();
    let bus = EventBus::default();

    let distributor = JobDistributor::new(pool.clone(), redis, bus, BidWeights::default(), 30, 20, 3);

    let worker_a = WorkerRegistry::register(&pool, "0xworker_a", "0xpubkey_a", vec!["cuda".to_string()], 100.0)
        .await
        .unwrap();
    let worker_b = WorkerRegistry::register(&pool, "0xworker_b", "0xpubkey_b", vec!["cuda".to_string()], 100.0)
        .await
        .unwrap();

    let job = distributor
        .submit_job("0xsubmitter", serde_json::json!({"model": "resnet50"}), None)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    distributor.submit_bid(job.id, worker_a.id, 10.0, 120).await.unwrap();
    distributor.submit_bid(job.id, worker_b.id, 5.0, 60).await.unwrap();

    let bids = JobQueries::bids_for_job(&pool, job.id).await.unwrap();
    let reputations = vec![0.8, 0.8];
    let healths = vec![0.9, 0.9];
    let scored = distributor.score_bids(&bids, &reputations, &healths);

    // worker_b bid lower on both amount and completion time, so with equal
    // reputation/health it should score strictly higher.
    assert_eq!(scored[0].0, worker_b.id);

    let task = distributor.assign_winner(job.id, scored[0].0).await.unwrap();
    assert_eq!(task.assigned_worker_id, Some(worker_b.id));

    let updated = JobQueries::get(&pool, job.id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Assigned);
    assert_eq!(updated.assigned_worker_id, Some(worker_b.id));
}

#[sqlx::test]
#[ignore]
async fn repeated_penalties_trigger_auto_ban(pool: PgPool) {
    setup(&pool).await;
    let redis = create_redis_pool(&redis_url()).await.unwrap();
    let bus = EventBus::default();

    let reputation = ReputationEngine::new(
        pool.clone(),
        redis,
        bus,
        ReputationWeights::default(),
        PenaltySeverities::default(),
        1.05,
        0.90,
        1.0,
        0.2,
        86_400,
        0.01,
        3,
        true,
        30,
        0.5,
        20,
    );

    let worker = WorkerRegistry::register(&pool, "0xmisbehaving", "0xpubkey_m", vec!["cuda".to_string()], 100.0)
        .await
        .unwrap();

    for _ in 0..3 {
        reputation
            .apply_penalty(worker.id, PenaltyKind::MaliciousBehavior, "submitted forged results", None)
            .await
            .unwrap();
    }

    let reloaded: (bool, i32) =
        sqlx::query_as("SELECT is_banned, malicious_count FROM worker_reputation WHERE worker_id = $1")
            .bind(worker.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(reloaded.0);
    assert_eq!(reloaded.1, 3);
}

#[sqlx::test]
#[ignore]
async fn unban_restores_active_status(pool: PgPool) {
    setup(&pool).await;
    let redis = create_redis_pool(&redis_url()).await.unwrap();
    let bus = EventBus::default();

    let reputation = ReputationEngine::new(
        pool.clone(),
        redis,
        bus,
        ReputationWeights::default(),
        PenaltySeverities::default(),
        1.05,
        0.90,
        1.0,
        0.2,
        86_400,
        0.01,
        1,
        true,
        30,
        0.5,
        20,
    );

    let worker = WorkerRegistry::register(&pool, "0xreformed", "0xpubkey_r", vec!["cuda".to_string()], 100.0)
        .await
        .unwrap();
    reputation
        .apply_penalty(worker.id, PenaltyKind::MaliciousBehavior, "submitted forged results", None)
        .await
        .unwrap();

    let banned: (bool,) = sqlx::query_as("SELECT is_banned FROM worker_reputation WHERE worker_id = $1")
        .bind(worker.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(banned.0);

    reputation.unban(worker.id).await.unwrap();

    let restored: (bool, i32) =
        sqlx::query_as("SELECT is_banned, malicious_count FROM worker_reputation WHERE worker_id = $1")
            .bind(worker.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!restored.0);
    assert_eq!(restored.1, 0);
}

#[sqlx::test]
#[ignore]
async fn job_exhausting_retries_publishes_refund(pool: PgPool) {
    setup(&pool).await;
    let redis = create_redis_pool(&redis_url()).await.unwrap();
    let bus = EventBus::default();
    let mut receiver = bus.subscribe();

    let distributor = JobDistributor::new(pool.clone(), redis, bus, BidWeights::default(), 30, 20, 0);

    let job = distributor
        .submit_job("0xsubmitter", serde_json::json!({}), None)
        .await
        .unwrap();

    distributor.retry_or_refund(job.id).await.unwrap();

    let updated = JobQueries::get(&pool, job.id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Failed);

    let event = receiver.try_recv().unwrap();
    match event {
        ciro_coordinator::bus::CoordinatorEvent::RefundRequired { job_id, .. } => {
            assert_eq!(job_id, job.id);
        }
        other => panic!("expected RefundRequired, got {other:?}"),
    }
}
