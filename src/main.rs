//! Round-robin HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request   ┌─────────┐    ┌────────────┐    ┌──────────────┐
//!     ────────────────▶│  http   │───▶│ dispatcher │───▶│   backend    │────▶ Origin
//!                      │ server  │    │ round robin│    │ cache/probe  │
//!     Client Response  └─────────┘    └────────────┘    │  /forward    │
//!     ◀──────────────────────────────────────────────────┴──────────────┘
//!
//!                      ┌──────────────────────────────────────────────┐
//!                      │ health sweep │ config watcher │ test origins │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use lb_proxy::config::validation::validate_config;
use lb_proxy::config::{load_config, BackendConfig, ConfigError, ConfigWatcher, ProxyConfig};
use lb_proxy::lifecycle::{shutdown_signal, Shutdown};
use lb_proxy::observability::{logging, metrics};
use lb_proxy::{HttpServer, TestBackend};

#[derive(Parser, Debug)]
#[command(name = "lb-proxy", version, about = "Round-robin HTTP load balancer")]
struct Cli {
    /// TOML config file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config.
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend URL, repeatable. Appended to the configured backends.
    #[arg(long = "backend")]
    backends: Vec<String>,

    /// Port of an in-process test origin, repeatable.
    #[arg(long = "test-backend")]
    test_backends: Vec<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    config.backends.extend(cli.backends.into_iter().map(BackendConfig::new));
    config.test_backends.ports.extend(cli.test_backends);
    for port in &config.test_backends.ports {
        let address = format!("http://localhost:{port}");
        if !config.backends.iter().any(|b| b.address == address) {
            config.backends.push(BackendConfig::new(address));
        }
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    tracing::info!("lb-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    for port in config.test_backends.ports.clone() {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let backend = Arc::new(TestBackend::new(port));
        let stop = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = backend.serve(listener, stop).await {
                tracing::error!(port, error = %e, "Test backend failed");
            }
        });
    }

    // Keeps the file watch alive for the lifetime of the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(config);
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
