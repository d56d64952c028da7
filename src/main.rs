//! drop-connection: HTTP response gate.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                 DROP-CONNECTION              │
//!   Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│   net    │──▶│   gate   │──▶│ upstream │──┼──▶ Upstream
//!                     │  │ listener │   │ (buffer) │   │ forwarder│  │    Server
//!                     │  └────┬─────┘   └────┬─────┘   └──────────┘  │
//!                     │       │              │ decide                │
//!   Client Response   │       │         ┌────┴─────┐                 │
//!   ◀─────────────────┼───────┴─────────│ replay / │                 │
//!   (or closed conn)  │                 │  drop    │                 │
//!                     │                 └──────────┘                 │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use drop_connection::config::{
    read_config, validate_config, ConfigError, ConfigOverrides, ConfigWatcher, GateConfig,
};
use drop_connection::net::Listener;
use drop_connection::observability::{logging, metrics};
use drop_connection::{lifecycle, GateServer, Shutdown};

#[derive(Parser)]
#[command(name = "drop-connection")]
#[command(about = "Drop client connections instead of returning selected upstream responses", long_about = None)]
struct Cli {
    /// TOML configuration file. Watched for gate policy changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener bind address, overrides the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Upstream host:port, overrides the config file.
    #[arg(long)]
    upstream: Option<String>,

    /// Status code range to drop, e.g. "500-599". Empty drops everything.
    #[arg(long)]
    status_code: Option<String>,
}

impl Cli {
    /// Flags that win over the config file, on startup and on every reload.
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind.clone(),
            upstream_address: self.upstream.clone(),
            status_code: self.status_code.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = cli.overrides();
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => GateConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::from)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("drop-connection v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server to keep delivering updates.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, overrides);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = GateServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    lifecycle::wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
