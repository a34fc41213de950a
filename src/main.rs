//! tiered-cache server.
//!
//! Owns the cache engine, drives its periodic sweep and exposes it over HTTP
//! until Ctrl-C, then stops the sweeper and flushes the durable tier.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use tiered_cache::config::{Cli, Config};
use tiered_cache::metrics::CacheMetrics;
use tiered_cache::server::http_api::{build_router, AppState};
use tiered_cache::{CacheEngine, SweepScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiered_cache=debug,tower_http=debug"
    } else {
        "tiered_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("tiered-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        max_entries = config.cache.max_entries,
        default_ttl_secs = config.cache.default_ttl_secs,
        sweep_interval_secs = config.cache.sweep_interval_secs,
        durable = config.persistence.durable,
        compression = config.compression.enabled,
        "Configuration loaded"
    );

    // Open the engine; this warms the memory tier from the durable store.
    let engine = Arc::new(CacheEngine::open(config.clone()).await?);

    // Start the sweeper.
    let sweeper = SweepScheduler::new(engine.clone(), config.sweep_interval()).spawn();

    // Build application state.
    let state = Arc::new(AppState {
        engine: engine.clone(),
        metrics: CacheMetrics::new()?,
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    sweeper.stop().await;
    engine.shutdown().await;

    Ok(())
}
