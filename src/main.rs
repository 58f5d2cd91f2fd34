//! WebSocket bridge (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌─────────────────────────────────────────────────┐
//!                      │                   WS BRIDGE                     │
//!                      │                                                 │
//!   WebSocket client   │  ┌─────────┐   ┌───────────┐   ┌────────────┐   │
//!   ───────────────────┼─▶│  http   │──▶│  bridge   │──▶│  backend   │───┼──▶ h2c backend
//!   ◀──────────────────┼──│ server  │◀──│ session   │◀──│  stream    │◀──┼───
//!                      │  └─────────┘   └─────┬─────┘   └────────────┘   │
//!                      │                      │                          │
//!                      │                ┌─────▼─────┐                    │
//!                      │                │  routing  │                    │
//!                      │                └───────────┘                    │
//!                      │  config · observability · lifecycle             │
//!                      └─────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ws_bridge::config::{load_config, watcher::ConfigWatcher, BridgeConfig};
use ws_bridge::lifecycle::{signals, Shutdown};
use ws_bridge::observability::logging;
use ws_bridge::BridgeServer;

#[derive(Parser)]
#[command(name = "ws-bridge")]
#[command(about = "Bridge WebSocket sessions onto HTTP/2 cleartext streams", long_about = None)]
struct Cli {
    /// TOML configuration file; watched for route changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("ws-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        max_sessions = config.listener.max_sessions,
        "Configuration loaded"
    );
    if config.routes.is_empty() {
        tracing::warn!("No routes configured; every session will fail to resolve");
    }

    // Keep the watcher alive for the life of the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = BridgeServer::new(config);
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
