//! Account Service
//! Mission: Register, authenticate and authorize users behind bearer tokens

use account_service::{create_router, AppServices, Config};
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::{net::SocketAddr, path::Path};
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = Config::parse();
    info!("🚀 Account service starting");

    let services = AppServices::from_config(&config)?;

    // Prune idle rate-limit windows so the table tracks only active clients
    let limiter = services.limiter.clone();
    tokio::spawn(async move {
        let mut ticker = interval(limiter.config().window * 2);
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });

    let app = create_router(&services);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("👋 Account service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        // Never resolve; the server keeps running until killed
        std::future::pending::<()>().await;
    }
}

/// Initialize tracing with an env-configurable filter
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "account_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory's .env when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
