//! Graph Runtime
//!
//! Folds a stream of cell transitions into the aggregated movement graph:
//! - Initializes the SQLite database with schema
//! - Spawns edge ingestion and the retention sweeper
//! - Reads one JSON `EdgeObservation` per stdin line
//!
//! Usage:
//!   cat transitions.jsonl | cargo run --release --bin graph_runtime
//!
//! Environment variables:
//!   HEXFLOW_DB_PATH - SQLite database path (default: data/hexflow.db)
//!   INGEST_CHANNEL_BUFFER - Channel size (default: 10000)
//!   INGEST_MAX_IN_FLIGHT - Ingestion shard workers (default: 64)
//!   NODE_RETENTION_DAYS - Observation log retention (default: 30)
//!   RETENTION_SWEEP_INTERVAL_MS - Sweep interval (default: 3600000)
//!   ENABLE_RETENTION - Retention sweeper switch (default: true)

use dotenv::dotenv;
use hexflow::config::GraphConfig;
use hexflow::graph::{
    ingestion::start_edge_ingestion, retention::start_retention_sweeper, EdgeAggregator,
    EdgeObservation, EdgeStore, GraphQueryService, NodeRecorder, SqliteEdgeStore,
    SqliteNodeRecorder,
};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Graph Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = GraphConfig::from_env();

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Channel buffer: {} observations", config.channel_buffer);
    info!("   ├─ Ingestion shards: {}", config.max_in_flight);
    info!(
        "   └─ Retention: {} ({} days, sweep every {}ms)",
        if config.retention_enabled { "ENABLED" } else { "DISABLED" },
        config.retention_days,
        config.sweep_interval_ms
    );

    // Initialize database
    info!("🔧 Initializing database...");
    let edge_store: Arc<dyn EdgeStore> = Arc::new(SqliteEdgeStore::open(&config.db_path)?);
    let recorder: Arc<dyn NodeRecorder> = Arc::new(SqliteNodeRecorder::open(&config.db_path)?);
    info!(
        "✅ Database initialized ({} edges, {} observations)",
        edge_store.count().await?,
        recorder.count().await?
    );

    let aggregator = Arc::new(EdgeAggregator::new(edge_store.clone()));
    let query = GraphQueryService::new(edge_store.clone());

    // Create observation channel
    let (tx, rx) = mpsc::channel::<EdgeObservation>(config.channel_buffer);
    info!("✅ Observation channel created (buffer: {})", config.channel_buffer);

    // Spawn background tasks
    info!("🚀 Spawning background tasks...");

    let ingestion = tokio::spawn(start_edge_ingestion(rx, aggregator, config.max_in_flight));
    info!("   ├─ ✅ Ingestion task spawned");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if config.retention_enabled {
        let handle = tokio::spawn(start_retention_sweeper(
            recorder.clone(),
            config.retention(),
            config.sweep_interval(),
            shutdown_rx,
        ));
        info!("   └─ ✅ Retention sweeper spawned");
        Some(handle)
    } else {
        info!("   └─ ⚠️  Retention sweeper disabled (set ENABLE_RETENTION=true to activate)");
        None
    };

    info!("");
    info!("🔄 Reading observations from stdin (CTRL+C or EOF to stop)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0u64;
    let mut malformed = 0u64;
    let mut rejected_lines = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("📭 End of input");
                        break;
                    }
                    Err(e) => {
                        error!("❌ Failed to read stdin: {}", e);
                        break;
                    }
                };
                line_number += 1;

                if line.trim().is_empty() {
                    continue;
                }

                match EdgeObservation::from_json_line(&line) {
                    Ok(observation) => {
                        if tx.send(observation).await.is_err() {
                            error!("❌ Ingestion stopped unexpectedly");
                            break;
                        }
                    }
                    Err(e) if e.is_invalid_observation() => {
                        rejected_lines += 1;
                        warn!("⚠️  Rejecting line {}: {}", line_number, e);
                    }
                    Err(e) => {
                        malformed += 1;
                        warn!("⚠️  Skipping malformed line {}: {}", line_number, e);
                    }
                }
            }

            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => {
                        info!("");
                        info!("⚠️  Received CTRL+C, shutting down...");
                    }
                    Err(err) => {
                        error!("❌ Failed to listen for CTRL+C: {}", err);
                    }
                }
                break;
            }
        }
    }

    // Cleanup: Drop tx to close channel, then wait for the shards to drain
    drop(tx);
    let stats = ingestion.await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        handle.await?;
    }

    let edges = query.edge_count().await?;

    info!("📊 Run summary:");
    info!("   ├─ Lines read: {} ({} malformed)", line_number, malformed);
    info!("   ├─ Folded: {}", stats.folded);
    info!("   ├─ Rejected: {}", stats.rejected + rejected_lines);
    info!("   ├─ Failed: {}", stats.failed);
    info!("   └─ Edges in graph: {}", edges);

    info!("✅ Graph runtime stopped");
    Ok(())
}
