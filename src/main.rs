//! Discovery gateway node.
//!
//! # Architecture Overview
//!
//! ```text
//!   instances ──register/heartbeat──▶ ┌──────────────┐ ◀──sweep── heartbeat processor
//!                                     │   registry   │
//!                                     │    store     │
//!                                     └──────┬───────┘
//!                                            │ healthy instances
//!                                            ▼
//!   client ──▶ gateway ──▶ router ──▶ round-robin selector ──▶ transport ──▶ instance
//!
//!   client ──▶ PATCH /pagamentos/{id}/confirmar
//!                 └──▶ circuit breaker "orders.updateStatus" ──▶ PUT /pedidos/{id}/pago
//!                        └── open / failure ──▶ CONFIRMADO_SEM_INTEGRACAO
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use discovery_gateway::config::{load_config, watcher::ConfigWatcher, NodeConfig};
use discovery_gateway::lifecycle::{shutdown_signal, Shutdown};
use discovery_gateway::observability::{logging, metrics};
use discovery_gateway::registry::RegistrationAgent;
use discovery_gateway::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "discovery-gateway", version, about = "Service registry, gateway and payment confirmation node")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => NodeConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), roles = ?config.roles(), "discovery-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    // The watcher must stay alive for as long as reloads are wanted.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), updates)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let agent_handle = if config.registration.enabled {
        let agent = RegistrationAgent::new(&config.registration, config.timeouts.request())?;
        tracing::info!(instance_id = %agent.instance_id(), registry = %config.registration.registry_url, "Self-registration enabled");
        Some(tokio::spawn(agent.run(shutdown.subscribe())))
    } else {
        None
    };

    let server = HttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    // Let the agent deregister before exiting.
    if let Some(handle) = agent_handle {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
