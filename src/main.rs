use anyhow::{Context, Result};
use autorestdb::{AppConfig, bootstrap, init_tracing, shutdown_signal};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::parse();

    let boot = bootstrap(&config)
        .await
        .context("failed to start autorestdb")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, boot.router.clone())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum serve error")?;

    boot.shutdown().await.context("failed to flush storage")?;
    Ok(())
}
