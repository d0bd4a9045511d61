//! CGI Gateway
//!
//! Serves HTTP and runs one external handler process per request, speaking
//! CGI/1.1 over the handler's environment and stdio.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     CGI GATEWAY                      │
//!                    │                                                      │
//!  Client Request    │  ┌─────────┐   ┌──────────┐   ┌──────────┐           │
//!  ──────────────────┼─▶│  http   │──▶│ security │──▶│ routing  │           │
//!                    │  │ server  │   │  limits  │   │ resolver │           │
//!                    │  └─────────┘   └──────────┘   └────┬─────┘           │
//!                    │                                    ▼                 │
//!                    │                          ┌──────────────────┐        │
//!                    │                          │ cgi coordinator  │        │
//!                    │                          │  env → spawn →   │ stdin  │  ┌─────────┐
//!                    │                          │  stream → decode │◀──────▶┼─▶│ handler │
//!  Client Response   │  ┌──────────┐            │                  │ stdout │  │ process │
//!  ◀─────────────────┼──│ response │◀───────────┤                  │ stderr │  └─────────┘
//!                    │  └──────────┘            └──────────────────┘        │
//!                    │                                                      │
//!                    │  config · observability · lifecycle (cross-cutting)  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use cgi_gateway::config::{load_config, validation::validate_config, ConfigError, GatewayConfig};
use cgi_gateway::http::HttpServer;
use cgi_gateway::lifecycle::{signals, startup, Shutdown};
use cgi_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cgi-gateway")]
#[command(about = "HTTP server that runs CGI handlers", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cgi-gateway starting");
    tracing::info!(
        config_file = ?cli.config,
        bind_addresses = ?config.listener.bind_addresses,
        document_root = %config.cgi.document_root,
        timeout_secs = config.cgi.timeout_secs,
        max_body_size = config.limits.max_body_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::prepare_directories(&config).await?;
    let server = HttpServer::new(config.clone())?;
    let stats = server.stats();
    let listeners = startup::bind_listeners(&config).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listeners, server_shutdown).await?;

    let snapshot = stats.snapshot();
    tracing::info!(
        requests = snapshot.requests,
        success = snapshot.success,
        client_errors = snapshot.client_errors,
        server_errors = snapshot.server_errors,
        timeouts = snapshot.timeouts,
        uploads = snapshot.uploads,
        "Shutdown complete"
    );
    Ok(())
}
