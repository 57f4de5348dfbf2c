use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridrank_common::Config;
use gridrank_engines::registry::default_engine_set;
use gridrank_engines::stealth::ProxyRotator;
use gridrank_scan::orchestrator::ScanOrchestrator;
use gridrank_scan::queue::ScanQueue;
use gridrank_scan::scheduler::ScanScheduler;
use gridrank_store::PgStore;

#[derive(Parser, Debug)]
#[command(name = "gridrank-scan", about = "Geo-grid rank scan worker")]
struct Args {
    /// Skip orphaned-scan recovery at startup
    #[arg(long)]
    skip_recovery: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("gridrank={}", config.log_level))),
        )
        .init();

    info!("GridRank scan worker starting...");
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool.clone()));
    store.migrate().await?;

    let proxies = Arc::new(ProxyRotator::new(config.proxy_list.clone()));
    let registry = Arc::new(default_engine_set(
        proxies,
        config.bing_search_api_key.clone(),
    ));
    info!(engines = ?registry.ids(), "Engine set ready");

    let queue = ScanQueue::new(
        registry.clone(),
        ScanOrchestrator::group_daily_total(&registry),
    );
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry,
        queue.clone(),
        config.default_grid_size as i32,
    );
    queue.set_handler(orchestrator.clone());

    if args.skip_recovery {
        info!("Startup recovery skipped by flag");
    } else {
        let recovered = orchestrator.recover_orphaned_scans().await?;
        info!(scans = recovered, "Startup recovery complete");
    }

    let scheduler = ScanScheduler::new(store.clone(), orchestrator.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    // Scheduler first so nothing new enqueues, then drain the queue,
    // then release the pool. In-flight work finishes within its own
    // request timeout; the next startup's recovery picks up the rest.
    scheduler.stop().await?;
    queue.stop().await;
    pool.close().await;

    info!("GridRank scan worker stopped");
    Ok(())
}
