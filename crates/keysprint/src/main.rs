//! # keysprint
//!
//! Typing-race server binary — wires the arena and the HTTP/WebSocket
//! server together and runs until interrupted.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keysprint_engine::Arena;
use keysprint_server::config::ServerConfig;
use keysprint_server::server::KeysprintServer;

/// keysprint typing-race server.
#[derive(Parser, Debug)]
#[command(name = "keysprint", about = "Real-time multiplayer typing-race server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Seconds between abandoned-game sweeps.
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Age in seconds after which a game nobody joined is reaped.
    #[arg(long)]
    abandoned_after_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        sweep_interval_secs: cli.sweep_interval_secs.unwrap_or(defaults.sweep_interval_secs),
        abandoned_after_secs: cli
            .abandoned_after_secs
            .unwrap_or(defaults.abandoned_after_secs),
        ..defaults
    };

    let arena = Arc::new(Arena::new());
    let server = Arc::new(KeysprintServer::new(config, arena, metrics));

    let (addr, serve_handle) = server.listen().await.context("failed to bind server")?;
    info!(%addr, "keysprint server listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("interrupt received, shutting down");

    server.shutdown().drain(vec![serve_handle], None).await;
    Ok(())
}
