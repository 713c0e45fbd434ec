use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use trailmark_config::TrailmarkConfig;
use trailmark_monitor::TraceStore;
use trailmark_server::corpus::StoreCorpus;
use trailmark_server::{build_router, seed, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = TrailmarkConfig::load().context("failed to load configuration")?;

    if let Some(parent) = config.db_path.parent() {
        fs::create_dir_all(parent).context("failed to create db directory")?;
    }
    let store = Arc::new(TraceStore::new(&config.db_path).context("failed to open trace store")?);
    info!("Trace store opened at {}", config.db_path.display());

    if let Some(seed_path) = &config.seed_path {
        if let Err(e) = seed::seed_store(&store, seed_path) {
            warn!("Seeding skipped: {:#}", e);
        }
    }

    let corpus = Arc::new(StoreCorpus::new(store.clone()));
    let state = Arc::new(ServerState::new(store, corpus, &config));
    let app = build_router(state);

    info!("Starting server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
