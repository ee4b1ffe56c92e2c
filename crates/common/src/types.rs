use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of decoded contract events the indexer can recognize.
///
/// `Undecodable` is not a decode failure in the Rust-error sense — it's a
/// recognized "this log didn't match any known signature" outcome that
/// still gets persisted, per the event store's append-only contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EventKind {
    JobSubmitted,
    JobAssigned,
    JobCompleted,
    JobFailed,
    JobCancelled,
    WorkerRegistered,
    WorkerSlashed,
    StakeDeposited,
    StakeWithdrawn,
    CrossRollupMessage,
    Undecodable,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::JobSubmitted => write!(f, "job_submitted"),
            EventKind::JobAssigned => write!(f, "job_assigned"),
            EventKind::JobCompleted => write!(f, "job_completed"),
            EventKind::JobFailed => write!(f, "job_failed"),
            EventKind::JobCancelled => write!(f, "job_cancelled"),
            EventKind::WorkerRegistered => write!(f, "worker_registered"),
            EventKind::WorkerSlashed => write!(f, "worker_slashed"),
            EventKind::StakeDeposited => write!(f, "stake_deposited"),
            EventKind::StakeWithdrawn => write!(f, "stake_withdrawn"),
            EventKind::CrossRollupMessage => write!(f, "cross_rollup_message"),
            EventKind::Undecodable => write!(f, "undecodable"),
        }
    }
}

/// A decoded (or undecodable) on-chain event, keyed uniquely by
/// `(block_hash, tx_index, event_index)` for at-most-once persistence.
/// `tx_index` locates the transaction within the block; `event_index`
/// locates the log within the block (not reset per transaction), which is
/// enough to keep `(block_number, tx_index, event_index)` a strict
/// ascending order even for two events from the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub tx_hash: String,
    pub tx_index: u64,
    pub event_index: u64,
    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub contract_address: String,
    pub event_selector: String,
    pub abi_version: i32,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub is_reorged: bool,
}

/// Per-chain indexer progress, with `version` used for optimistic locking
/// so a crashed orchestrator can't clobber a concurrently-advanced cursor.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexerCursor {
    pub chain_id: i64,
    pub last_indexed_block: i64,
    pub last_indexed_hash: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a registered worker. Banning lives on
/// `WorkerReputation.is_banned` instead of a status variant here, since a
/// banned worker still reports a real operational state (it may keep
/// heartbeating while locked out of auctions) and the two axes shouldn't be
/// conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum WorkerStatus {
    Offline,
    Idle,
    Busy,
    Maintenance,
    Error,
}

/// A registered compute worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Worker {
    pub id: Uuid,
    pub address: String,
    pub public_key: String,
    pub capabilities: Vec<String>,
    pub stake_amount: f64,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Latest telemetry sample for a worker, used to derive `health_score`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerHealth {
    pub worker_id: Uuid,
    pub cpu_load: f64,
    pub gpu_load: f64,
    pub memory_used_bytes: i64,
    pub memory_total_bytes: i64,
    pub queue_depth: i32,
    pub health_score: f64,
    /// The heartbeat's `monotonic_sequence`, persisted so the Telemetry
    /// Sink can reject a replayed or out-of-order heartbeat without a
    /// separate tracking table.
    pub last_sequence: i64,
    pub sampled_at: DateTime<Utc>,
}

impl WorkerHealth {
    /// Derives a 0.0-1.0 composite from load/queue signals (§4.5): lower
    /// load and shallower queues score higher.
    pub fn derive_health_score(cpu_load: f64, gpu_load: f64, queue_depth: i32) -> f64 {
        let load_component = 1.0 - ((cpu_load + gpu_load) / 2.0).clamp(0.0, 1.0);
        let queue_component = 1.0 - (queue_depth as f64 / 100.0).clamp(0.0, 1.0);
        (0.6 * load_component + 0.4 * queue_component).clamp(0.0, 1.0)
    }
}

/// A worker's composite reputation score and its components.
///
/// `malicious_count` tracks only `PenaltyKind::MaliciousBehavior` penalties
/// and is never cleared by a successful job — it persists until an
/// administrative `unban` — so a worker can't launder a malicious streak by
/// interleaving a single good job between bad ones.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerReputation {
    pub worker_id: Uuid,
    pub score: f64,
    pub success_rate: f64,
    pub reliability: f64,
    pub efficiency: f64,
    pub consistency: f64,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub malicious_count: i32,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub last_decay_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Categories of worker misbehavior the Reputation Engine penalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PenaltyKind {
    JobTimeout,
    JobFailure,
    MaliciousBehavior,
    PoorPerformance,
    NetworkIssues,
    ResourceAbuse,
    InvalidResult,
    Spam,
    Ban,
}

/// A recorded penalty event against a worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Penalty {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub kind: PenaltyKind,
    pub severity: f64,
    pub reason: String,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// A compute job submitted to the network.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub submitter: String,
    pub status: JobStatus,
    pub assigned_worker_id: Option<Uuid>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of an individual task within a job (§4.7 decomposes
/// jobs into one or more tasks with explicit dependency edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Assigned,
    Processing,
    Completed,
    Failed,
}

/// A unit of work belonging to a job, optionally depending on other tasks.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: TaskStatus,
    pub dependencies: Vec<Uuid>,
    pub retry_count: i32,
    pub assigned_worker_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A worker's bid in a job auction.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub amount: f64,
    pub estimated_completion_secs: i64,
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}
