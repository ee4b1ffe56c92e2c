use alloy::primitives::Address;
use ciro_common::config::AppConfig;
use ciro_common::db;
use ciro_decoders::{ContractAddresses, DecoderRegistry};
use ciro_indexer::event_store::PgEventStore;
use ciro_indexer::orchestrator::Orchestrator;
use ciro_indexer::rpc::RpcAdapter;
use clap::Parser;
use tokio::sync::watch;

/// CLI flags override the corresponding environment variable read by
/// `AppConfig::from_env` (§6) — neither source is required on its own,
/// but at least `--rpc-url`/`RPC_URL` and `--db`/`DATABASE_URL` must
/// resolve to something or startup fails with a Fatal error.
#[derive(Parser, Debug)]
#[command(name = "ciro-indexer")]
struct Cli {
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    poll_interval: Option<u64>,

    #[arg(long)]
    batch_size: Option<u64>,

    #[arg(long)]
    from_block: Option<u64>,

    #[arg(long)]
    reorg_safety: Option<u64>,

    /// Address of the deployed job registry contract.
    #[arg(long)]
    job_registry: Option<String>,

    /// Address of the deployed worker/staking registry contract.
    #[arg(long)]
    worker_registry: Option<String>,

    /// Address of the deployed cross-rollup bridge contract.
    #[arg(long)]
    bridge: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ciro_indexer=info,ciro_decoders=debug".into()),
        )
        .json()
        .init();

    tracing::info!("ciro-indexer starting");

    let mut config = AppConfig::from_env()?;
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc_url = rpc_url;
    }
    if let Some(db_url) = cli.db {
        config.database_url = db_url;
    }
    if let Some(poll_interval) = cli.poll_interval {
        config.indexer_poll_interval_ms = poll_interval;
    }
    if let Some(batch_size) = cli.batch_size {
        config.indexer_batch_size = batch_size;
    }
    if let Some(from_block) = cli.from_block {
        config.indexer_from_block = Some(from_block);
    }
    if let Some(reorg_safety) = cli.reorg_safety {
        config.indexer_reorg_safety = reorg_safety;
    }

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    let contract_addresses = ContractAddresses {
        job_registry: cli.job_registry.unwrap_or_default(),
        worker_registry: cli.worker_registry.unwrap_or_default(),
        bridge: cli.bridge.unwrap_or_default(),
    };

    let rpc = RpcAdapter::new(
        &config.rpc_url,
        config.rpc_fallback_url.as_deref(),
        config.rpc_max_retries,
        config.rpc_base_backoff_ms,
        config.rpc_max_backoff_ms,
        config.rpc_rate_limit_per_sec,
    )?;

    let decoders = DecoderRegistry::new(&contract_addresses);
    let store = PgEventStore::new(pool);

    let filter_addresses: Vec<Address> = [
        &contract_addresses.job_registry,
        &contract_addresses.worker_registry,
        &contract_addresses.bridge,
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .filter_map(|s| s.parse().ok())
    .collect();

    let mut orchestrator = Orchestrator::new(
        rpc,
        decoders,
        store,
        filter_addresses,
        std::time::Duration::from_millis(config.indexer_poll_interval_ms),
        config.indexer_batch_size,
        config.indexer_reorg_safety,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::select! {
        result = orchestrator.run(config.indexer_from_block.unwrap_or(0), shutdown_rx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "orchestrator exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping gracefully...");
            let _ = shutdown_tx.send(true);
        }
    }

    tracing::info!("ciro-indexer stopped");
    Ok(())
}
