use serde::Deserialize;
use std::collections::HashMap;

use crate::types::PenaltyKind;

/// Weights for the Reputation Engine's composite score (§4.6).
///
/// `success + reliability + efficiency + consistency` should sum to `1.0`;
/// this isn't enforced at parse time since operators may intentionally
/// deviate, but `is_normalized` is available for diagnostics/dashboards.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReputationWeights {
    pub success: f64,
    pub reliability: f64,
    pub efficiency: f64,
    pub consistency: f64,
}

impl ReputationWeights {
    pub fn is_normalized(&self) -> bool {
        (self.success + self.reliability + self.efficiency + self.consistency - 1.0).abs() < 1e-6
    }
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            success: 0.40,
            reliability: 0.25,
            efficiency: 0.20,
            consistency: 0.15,
        }
    }
}

/// Weights for the Job Distributor's bid scoring formula (§4.7).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BidWeights {
    pub reputation: f64,
    pub health: f64,
    pub bid_amount: f64,
    pub completion_time: f64,
}

impl Default for BidWeights {
    fn default() -> Self {
        Self {
            reputation: 0.35,
            health: 0.25,
            bid_amount: 0.25,
            completion_time: 0.15,
        }
    }
}

/// Per-kind penalty severities (§4.6). Each is a configuration knob per the
/// Open Questions in §9: "treat the table in §4.6 as authoritative and
/// expose each as a configuration knob".
#[derive(Debug, Clone)]
pub struct PenaltySeverities {
    severities: HashMap<PenaltyKind, f64>,
}

impl PenaltySeverities {
    pub fn severity_for(&self, kind: PenaltyKind) -> f64 {
        self.severities.get(&kind).copied().unwrap_or(0.1)
    }
}

impl Default for PenaltySeverities {
    fn default() -> Self {
        use PenaltyKind::*;
        let severities = HashMap::from([
            (JobTimeout, 0.15),
            (JobFailure, 0.20),
            (MaliciousBehavior, 0.50),
            (PoorPerformance, 0.10),
            (NetworkIssues, 0.05),
            (ResourceAbuse, 0.25),
            (InvalidResult, 0.30),
            (Spam, 0.10),
            (Ban, 1.0),
        ]);
        Self { severities }
    }
}

/// Global application configuration loaded from environment variables.
///
/// Secrets (`signing_key_path`, `admin_api_key`, `database_url`,
/// `redis_url`) are intentionally redacted from the hand-written `Debug`
/// impl below so they never end up in logs.
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    /// Rollup JSON-RPC endpoint consumed by the RPC Adapter (§4.1).
    pub rpc_url: String,
    /// Fallback RPC endpoint, tried when the primary is unreachable.
    pub rpc_fallback_url: Option<String>,

    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum number of PostgreSQL connections in the pool.
    pub db_max_connections: u32,

    /// Redis connection string (ephemeral auction markers, decay gating).
    pub redis_url: String,

    /// HTTP listen address for the Coordinator Facade.
    pub listen_addr: String,

    /// Path to the signing key used for refund/intent transactions.
    pub signing_key_path: Option<String>,

    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Static key administrative endpoints (e.g. unban) require.
    pub admin_api_key: String,

    // ---- Indexer Orchestrator (§4.3) ----
    pub indexer_poll_interval_ms: u64,
    pub indexer_batch_size: u64,
    pub indexer_reorg_safety: u64,
    pub indexer_from_block: Option<u64>,

    // ---- RPC Adapter (§4.1) ----
    pub rpc_max_retries: u32,
    pub rpc_base_backoff_ms: u64,
    pub rpc_max_backoff_ms: u64,
    pub rpc_rate_limit_per_sec: u32,

    // ---- Telemetry Sink (§4.5) ----
    pub heartbeat_ttl_secs: i64,

    // ---- Reputation Engine (§4.6) ----
    pub reputation_weights: ReputationWeights,
    pub penalty_severities: PenaltySeverities,
    pub success_multiplier: f64,
    pub failure_multiplier: f64,
    pub max_score: f64,
    pub min_reputation: f64,
    pub decay_interval_secs: i64,
    pub decay_rate: f64,
    pub auto_ban_threshold: u32,
    pub auto_ban_enabled: bool,
    /// Trailing sample count for the `reliability`/`efficiency` components.
    pub reliability_window: i64,
    /// A heartbeat counts toward `reliability` only if its `health_score`
    /// is at or above this threshold.
    pub healthy_health_score_threshold: f64,
    /// Trailing completed-task count for the `consistency` component.
    pub consistency_window: i64,

    // ---- Job Distributor (§4.7) ----
    pub bid_weights: BidWeights,
    pub auction_duration_secs: i64,
    pub auction_max_bids: u32,
    pub job_max_retries: u32,
    pub watchdog_interval_secs: u64,

    // ---- Worker Registry (§3, §6) ----
    pub min_stake_amount: f64,

    // ---- Chain event consumer (Design Notes §9) ----
    pub chain_event_poll_interval_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_fallback_url", &self.rpc_fallback_url)
            .field("database_url", &"<redacted>")
            .field("redis_url", &"<redacted>")
            .field("listen_addr", &self.listen_addr)
            .field(
                "signing_key_path",
                &self.signing_key_path.as_ref().map(|_| "<redacted>"),
            )
            .field("log_level", &self.log_level)
            .field("admin_api_key", &"<redacted>")
            .field("indexer_poll_interval_ms", &self.indexer_poll_interval_ms)
            .field("indexer_batch_size", &self.indexer_batch_size)
            .field("indexer_reorg_safety", &self.indexer_reorg_safety)
            .finish_non_exhaustive()
    }
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid value")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// CLI flags on the `ciro-indexer`/`ciro-coordinator` binaries take
    /// precedence and are layered on top of the result of this call.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rpc_url: std::env::var("RPC_URL")
                .map_err(|_| anyhow::anyhow!("RPC_URL environment variable is required"))?,
            rpc_fallback_url: std::env::var("RPC_FALLBACK_URL").ok(),

            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 20)?,

            redis_url: env_var("REDIS_URL", "redis://localhost:6379"),

            listen_addr: env_var("LISTEN_ADDR", "0.0.0.0:3000"),

            signing_key_path: std::env::var("SIGNING_KEY_PATH").ok(),

            log_level: env_var("LOG_LEVEL", "info"),

            admin_api_key: std::env::var("ADMIN_API_KEY")
                .map_err(|_| anyhow::anyhow!("ADMIN_API_KEY environment variable is required"))?,

            indexer_poll_interval_ms: env_parse("INDEXER_POLL_INTERVAL_MS", 1500)?,
            indexer_batch_size: env_parse("INDEXER_BATCH_SIZE", 500)?,
            indexer_reorg_safety: env_parse("INDEXER_REORG_SAFETY", 12)?,
            indexer_from_block: match std::env::var("INDEXER_FROM_BLOCK") {
                Ok(raw) => Some(
                    raw.parse()
                        .map_err(|_| anyhow::anyhow!("INDEXER_FROM_BLOCK must be a valid u64"))?,
                ),
                Err(_) => None,
            },

            rpc_max_retries: env_parse("RPC_MAX_RETRIES", 5)?,
            rpc_base_backoff_ms: env_parse("RPC_BASE_BACKOFF_MS", 250)?,
            rpc_max_backoff_ms: env_parse("RPC_MAX_BACKOFF_MS", 30_000)?,
            rpc_rate_limit_per_sec: env_parse("RPC_RATE_LIMIT_PER_SEC", 20)?,

            heartbeat_ttl_secs: env_parse("HEARTBEAT_TTL_SECS", 60)?,

            reputation_weights: ReputationWeights {
                success: env_parse("REPUTATION_WEIGHT_SUCCESS", 0.40)?,
                reliability: env_parse("REPUTATION_WEIGHT_RELIABILITY", 0.25)?,
                efficiency: env_parse("REPUTATION_WEIGHT_EFFICIENCY", 0.20)?,
                consistency: env_parse("REPUTATION_WEIGHT_CONSISTENCY", 0.15)?,
            },
            penalty_severities: PenaltySeverities::default(),
            success_multiplier: env_parse("REPUTATION_SUCCESS_MULTIPLIER", 1.05)?,
            failure_multiplier: env_parse("REPUTATION_FAILURE_MULTIPLIER", 0.90)?,
            max_score: env_parse("REPUTATION_MAX_SCORE", 1.0)?,
            min_reputation: env_parse("REPUTATION_MIN_ELIGIBLE", 0.2)?,
            decay_interval_secs: env_parse("REPUTATION_DECAY_INTERVAL_SECS", 86_400)?,
            decay_rate: env_parse("REPUTATION_DECAY_RATE", 0.01)?,
            auto_ban_threshold: env_parse("REPUTATION_AUTO_BAN_THRESHOLD", 3)?,
            auto_ban_enabled: env_parse("REPUTATION_AUTO_BAN_ENABLED", true)?,
            reliability_window: env_parse("REPUTATION_RELIABILITY_WINDOW", 20)?,
            healthy_health_score_threshold: env_parse("REPUTATION_HEALTHY_THRESHOLD", 0.5)?,
            consistency_window: env_parse("REPUTATION_CONSISTENCY_WINDOW", 20)?,

            bid_weights: BidWeights {
                reputation: env_parse("BID_WEIGHT_REPUTATION", 0.35)?,
                health: env_parse("BID_WEIGHT_HEALTH", 0.25)?,
                bid_amount: env_parse("BID_WEIGHT_AMOUNT", 0.25)?,
                completion_time: env_parse("BID_WEIGHT_COMPLETION_TIME", 0.15)?,
            },
            auction_duration_secs: env_parse("AUCTION_DURATION_SECS", 30)?,
            auction_max_bids: env_parse("AUCTION_MAX_BIDS", 20)?,
            job_max_retries: env_parse("JOB_MAX_RETRIES", 3)?,
            watchdog_interval_secs: env_parse("WATCHDOG_INTERVAL_SECS", 5)?,

            min_stake_amount: env_parse("WORKER_MIN_STAKE_AMOUNT", 1.0)?,

            chain_event_poll_interval_ms: env_parse("CHAIN_EVENT_POLL_INTERVAL_MS", 5_000)?,
        })
    }
}
