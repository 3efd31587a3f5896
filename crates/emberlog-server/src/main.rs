mod auth;
mod config;
mod error;
mod http;
mod metrics;
mod pipeline;
mod state;
mod store;
mod upload;

use anyhow::Context;
use clap::Parser;
use config::{AppConfig, Cli};
use http::router;
use crate::metrics::init_metrics;
use state::AppState;
use std::net::SocketAddr;
use std::time::Duration;
use store::IncidentStore;
use tracing::{info, warn};

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside development.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::from(&cli);
    if config.api_token.is_none() {
        warn!("API_TOKEN is not set, every mutating request will be rejected");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.upload_dir.display()))?;

    let store = IncidentStore::open(config.data_file.clone()).await;
    let handle = init_metrics().context("Failed to install Prometheus metrics recorder")?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, store).with_metrics(handle);

    let pruner = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let pruned = pruner.prune_rate_limits();
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned idle rate-limit entries");
            }
        }
    });

    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(
        data_file = ?state.store.data_file(),
        upload_dir = ?state.config.upload_dir,
        "Server running on http://{}",
        bind_addr
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!(uptime_secs = state.uptime_seconds(), "Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
