//! swift-server
//!
//! Runs the listeners of a TOML configuration until SIGINT/SIGTERM.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   client ──────▶│ net::listener → net::negotiate (TLS + ALPN)   │
//!                 │      │                                        │
//!                 │      ├─ static files: http (HTTP/1.1 | h2)    │
//!                 │      │      → static_files::handler           │
//!                 │      │      → sendfile | chunked | DATA frames│
//!                 │      │                                        │
//!                 │      └─ reverse proxy: proxy::relay ──────────┼──▶ backend
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! Without `--config` the current directory is served on port 8080.

use std::path::PathBuf;

use clap::Parser;

use swift_server::config::{load_config, ServerConfig, SwiftConfig};
use swift_server::lifecycle::{shutdown_on_signal, Swift};
use swift_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "swift-server")]
#[command(about = "Static file server and TCP reverse proxy", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SwiftConfig {
            servers: vec![ServerConfig::static_files(8080, ".")],
            ..SwiftConfig::default()
        },
    };

    logging::init(&config.observability);
    tracing::info!(
        config = ?cli.config,
        servers = config.servers.len(),
        "swift-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let running = Swift::from_config(&config)?.start().await?;
    for addr in running.local_addrs() {
        tracing::info!(address = %addr, "Listening for connections");
    }

    tokio::spawn(shutdown_on_signal(running.shutdown_handle()));
    running.join().await;

    tracing::info!("swift-server stopped");
    Ok(())
}
