//! `ciro-coordinator` binary entrypoint — the Coordinator Facade (§4.8).
//!
//! Shares its database pool, Redis connection manager, and in-process
//! notification bus with the Reputation Engine, Job Distributor and
//! Telemetry Sink, the way the inherited `flare-api`/`flare-engine` pair
//! shared a single `AppState`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ciro_common::config::AppConfig;
use ciro_common::db::create_pool;
use ciro_common::redis_pool::create_redis_pool;
use ciro_coordinator::bus::{CoordinatorEvent, EventBus};
use ciro_coordinator::distributor::JobDistributor;
use ciro_coordinator::reputation::ReputationEngine;
use ciro_coordinator::telemetry::TelemetrySink;
use ciro_coordinator::watchdog::Watchdog;
use ciro_indexer::rpc::RpcAdapter;

use ciro_api::routes::create_router;
use ciro_api::state::AppState;
use ciro_indexer::event_store::PgEventStore;

mod chain_events;
use chain_events::ChainEventConsumer;

/// CLI flags override the corresponding environment variable read by
/// `AppConfig::from_env` (§6), mirroring `ciro-indexer`'s flag layering.
#[derive(Parser, Debug)]
#[command(name = "ciro-coordinator")]
struct Cli {
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    listen: Option<String>,

    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        dotenvy::from_path(path).ok();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("ciro_api=debug,ciro_coordinator=debug,tower_http=debug")
        }))
        .json()
        .init();

    tracing::info!("ciro-coordinator starting");

    let mut config = AppConfig::from_env()?;
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc_url = rpc_url;
    }
    if let Some(db_url) = cli.db {
        config.database_url = db_url;
    }
    if let Some(listen_addr) = cli.listen {
        config.listen_addr = listen_addr;
    }

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("database pool created");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("redis connection established");

    let bus = EventBus::default();

    let reputation = Arc::new(ReputationEngine::new(
        pool.clone(),
        redis.clone(),
        bus.clone(),
        config.reputation_weights,
        config.penalty_severities.clone(),
        config.success_multiplier,
        config.failure_multiplier,
        config.max_score,
        config.min_reputation,
        config.decay_interval_secs,
        config.decay_rate,
        config.auto_ban_threshold,
        config.auto_ban_enabled,
        config.reliability_window,
        config.healthy_health_score_threshold,
        config.consistency_window,
    ));

    let distributor = Arc::new(JobDistributor::new(
        pool.clone(),
        redis.clone(),
        bus.clone(),
        config.bid_weights,
        config.auction_duration_secs,
        config.auction_max_bids,
        config.job_max_retries,
    ));

    let telemetry = Arc::new(TelemetrySink::new(pool.clone(), bus.clone(), config.heartbeat_ttl_secs));

    let watchdog = Watchdog::new(pool.clone(), bus.clone(), distributor.clone());
    tokio::spawn(watchdog.run(reputation.clone(), Duration::from_secs(config.watchdog_interval_secs)));

    let decay_reputation = reputation.clone();
    let decay_interval = Duration::from_secs(config.decay_interval_secs.max(1) as u64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(decay_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = decay_reputation.tick_decay().await {
                tracing::error!(error = %e, "reputation decay tick failed");
            }
        }
    });

    // Refund submission belongs to whichever binary holds the RPC Adapter,
    // since the Job Distributor itself never holds chain keys (Design
    // Notes §9). This binary owns the adapter and listens for the fact.
    let rpc = RpcAdapter::new(
        &config.rpc_url,
        config.rpc_fallback_url.as_deref(),
        config.rpc_max_retries,
        config.rpc_base_backoff_ms,
        config.rpc_max_backoff_ms,
        config.rpc_rate_limit_per_sec,
    )?;
    let rpc = Arc::new(rpc);
    let mut refund_events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match refund_events.recv().await {
                Ok(CoordinatorEvent::RefundRequired { job_id, submitter }) => {
                    tracing::warn!(job_id = %job_id, submitter, "refund required, awaiting on-chain settlement");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "refund listener lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Folds on-chain settlement facts (job completion/failure, slashing)
    // into the Reputation Engine, reading events the indexer already
    // persisted rather than re-subscribing to raw logs itself.
    let event_store = PgEventStore::new(pool.clone());
    let chain_event_consumer = ChainEventConsumer::new(pool.clone(), event_store, reputation.clone());
    let consumer_rpc = rpc.clone();
    tokio::spawn(chain_event_consumer.run(
        consumer_rpc,
        Duration::from_millis(config.chain_event_poll_interval_ms),
    ));

    let state = AppState::new(pool, redis, config.clone(), bus, distributor, reputation, telemetry);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000)));
    tracing::info!(%addr, "coordinator facade listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
