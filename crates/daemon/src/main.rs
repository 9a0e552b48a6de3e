//! clipdock daemon - Main Entry Point
//! Accepts streamed uploads over JSON-RPC and writes them under the media directory

mod config;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipdock_api_rpc::{RpcServer, RpcServerConfig, StreamRegistry, StreamRegistryConfig};
use clipdock_core::application::{
    shutdown_channel, BoundedQueue, IngestConfig, IngestService, ListingService, QueueConfig,
};
use clipdock_core::port::id_provider::UuidProvider;
use clipdock_infra_fs::{FsMediaCatalog, FsStorageWriter};
use config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long shutdown waits for admitted uploads to finish writing
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_logging(log_format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("clipdock=info"))?;

    match log_format {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration and initialize logging
    let config = DaemonConfig::from_env()?;
    init_logging(&config.log_format)?;

    info!("clipdock daemon v{} starting...", VERSION);
    info!(
        max_pending = config.max_pending,
        concurrency = config.concurrency,
        capacity_mode = %config.capacity_mode,
        media_dir = %config.media_dir.display(),
        "Configuration loaded"
    );

    // 2. Storage adapters
    let writer = Arc::new(FsStorageWriter::new(&config.media_dir, config.collision_policy).await?);
    let catalog = Arc::new(FsMediaCatalog::new(&config.media_dir));

    // 3. Setup dependencies (DI wiring)
    let queue_config = QueueConfig::new(config.max_pending, config.concurrency)?
        .with_capacity_mode(config.capacity_mode);
    let queue = BoundedQueue::new(queue_config, Arc::new(UuidProvider));
    let ingest = IngestService::new(
        queue.clone(),
        writer,
        IngestConfig {
            admission_wait: config.admission_wait,
            ..Default::default()
        },
    );
    let streams = Arc::new(StreamRegistry::new(
        ingest,
        Arc::new(UuidProvider),
        StreamRegistryConfig {
            idle_timeout: config.stream_idle_timeout,
            ..Default::default()
        },
    ));
    let listing = ListingService::new(catalog);

    // 4. Stream reaper
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let reaper_handle = tokio::spawn(Arc::clone(&streams).run_reaper(shutdown_rx));

    // 5. Start JSON-RPC server
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: config.rpc_host.clone(),
            port: config.rpc_port,
        },
        streams,
        listing,
    );
    let (addr, rpc_handle) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Waiting for uploads...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop accepting, then let admitted uploads finish
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    let _ = reaper_handle.await;

    if tokio::time::timeout(DRAIN_TIMEOUT, queue.wait_idle())
        .await
        .is_err()
    {
        let stats = queue.stats();
        warn!(
            pending = stats.pending,
            active = stats.active,
            "Uploads still in progress at shutdown"
        );
    }

    info!("Shutdown complete.");

    Ok(())
}
