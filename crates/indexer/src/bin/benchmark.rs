//! ciro-indexer catch-up benchmark
//!
//! Measures RPC fetch + decode latency over a range of recent blocks
//! against a live RPC endpoint, to check catch-up throughput stays
//! reasonable before running a full backfill.
//!
//! ```bash
//! RPC_URL="https://..." cargo run --bin catchup-benchmark
//! BENCHMARK_BLOCKS=100 cargo run --bin catchup-benchmark
//! ```
//!
//! Does not require a database — it measures RPC fetch + decode latency
//! only, which is the bottleneck for catch-up throughput.

use std::time::{Duration, Instant};

use ciro_decoders::{ContractAddresses, DecoderRegistry};
use ciro_indexer::rpc::RpcAdapter;

struct BlockMetrics {
    fetch_block_ms: f64,
    fetch_logs_ms: f64,
    decode_ms: f64,
    total_ms: f64,
    log_count: usize,
}

struct AggregateStats {
    block_count: usize,
    total_logs: usize,
    avg_total_ms: f64,
    p50_total_ms: f64,
    p95_total_ms: f64,
    max_total_ms: f64,
    avg_fetch_block_ms: f64,
    avg_fetch_logs_ms: f64,
    avg_decode_ms: f64,
}

fn compute_percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn compute_stats(metrics: &[BlockMetrics]) -> AggregateStats {
    let n = metrics.len();
    let total_logs: usize = metrics.iter().map(|m| m.log_count).sum();

    let avg_total = metrics.iter().map(|m| m.total_ms).sum::<f64>() / n as f64;
    let avg_fetch_block = metrics.iter().map(|m| m.fetch_block_ms).sum::<f64>() / n as f64;
    let avg_fetch_logs = metrics.iter().map(|m| m.fetch_logs_ms).sum::<f64>() / n as f64;
    let avg_decode = metrics.iter().map(|m| m.decode_ms).sum::<f64>() / n as f64;

    let mut totals: Vec<f64> = metrics.iter().map(|m| m.total_ms).collect();
    totals.sort_by(|a, b| a.partial_cmp(b).unwrap());

    AggregateStats {
        block_count: n,
        total_logs,
        avg_total_ms: avg_total,
        p50_total_ms: compute_percentile(&totals, 50.0),
        p95_total_ms: compute_percentile(&totals, 95.0),
        max_total_ms: *totals.last().unwrap_or(&0.0),
        avg_fetch_block_ms: avg_fetch_block,
        avg_fetch_logs_ms: avg_fetch_logs,
        avg_decode_ms: avg_decode,
    }
}

fn print_report(stats: &AggregateStats, wall_elapsed: Duration, rpc_url: &str) {
    let target_ms = 2000.0;
    let pass = stats.p95_total_ms < target_ms;

    println!();
    println!("ciro-indexer catch-up benchmark");
    println!("────────────────────────────────────────");
    println!("RPC endpoint:     {rpc_url}");
    println!("Blocks processed: {}", stats.block_count);
    println!("Total logs:       {}", stats.total_logs);
    println!("Wall clock:       {:.1}s", wall_elapsed.as_secs_f64());
    println!(
        "Throughput:       {:.1} blocks/sec",
        stats.block_count as f64 / wall_elapsed.as_secs_f64()
    );
    println!();
    println!("fetch block avg:  {:.1}ms", stats.avg_fetch_block_ms);
    println!("fetch logs avg:   {:.1}ms", stats.avg_fetch_logs_ms);
    println!("decode avg:       {:.1}ms", stats.avg_decode_ms);
    println!("p50 total:        {:.1}ms", stats.p50_total_ms);
    println!("p95 total:        {:.1}ms", stats.p95_total_ms);
    println!("max total:        {:.1}ms", stats.max_total_ms);
    println!();
    println!(
        "target p95 < {:.0}ms: {}",
        target_ms,
        if pass { "PASS" } else { "FAIL" }
    );
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter("catchup_benchmark=info,warn")
        .init();

    let rpc_url = std::env::var("RPC_URL")
        .map_err(|_| anyhow::anyhow!("RPC_URL environment variable is required"))?;
    let block_count: u64 = std::env::var("BENCHMARK_BLOCKS")
        .unwrap_or_else(|_| "50".to_string())
        .parse()
        .expect("BENCHMARK_BLOCKS must be a valid number");

    let rpc = RpcAdapter::new(&rpc_url, None, 3, 200, 5_000, 20)?;
    let decoders = DecoderRegistry::new(&ContractAddresses::default());

    let latest = rpc.latest_block_number().await?;
    let start_block = latest.saturating_sub(block_count);

    println!("chain tip: #{latest}, range: #{start_block} -> #{latest}");

    let mut metrics = Vec::with_capacity(block_count as usize);
    let wall_start = Instant::now();

    for block_num in start_block..latest {
        let block_start = Instant::now();

        let fetch_block_start = Instant::now();
        let block = match rpc.block_by_number(block_num).await {
            Ok(b) => b,
            Err(e) => {
                eprintln!("block {block_num} not available: {e}, skipping");
                continue;
            }
        };
        let fetch_block_ms = fetch_block_start.elapsed().as_secs_f64() * 1000.0;
        let _ = block.header.timestamp;

        let fetch_logs_start = Instant::now();
        let logs = rpc.events_in_range(&[], block_num, block_num).await?;
        let fetch_logs_ms = fetch_logs_start.elapsed().as_secs_f64() * 1000.0;

        let decode_start = Instant::now();
        for log in &logs {
            let _ = decoders.decode(&log.inner);
        }
        let decode_ms = decode_start.elapsed().as_secs_f64() * 1000.0;

        let total_ms = block_start.elapsed().as_secs_f64() * 1000.0;

        metrics.push(BlockMetrics {
            fetch_block_ms,
            fetch_logs_ms,
            decode_ms,
            total_ms,
            log_count: logs.len(),
        });
    }

    let wall_elapsed = wall_start.elapsed();

    if metrics.is_empty() {
        println!("no blocks processed, nothing to report");
        return Ok(());
    }

    let stats = compute_stats(&metrics);
    print_report(&stats, wall_elapsed, &rpc_url);

    if stats.p95_total_ms >= 2000.0 {
        std::process::exit(1);
    }

    Ok(())
}
