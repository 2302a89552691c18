//! Thermomatic server binary.
//!
//! One process, two listeners: the TCP ingest port devices stream to and
//! the HTTP port operators query. SIGINT/SIGTERM drain both gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use thermomatic_server::config::ServerConfig;
use thermomatic_server::registry::DeviceRegistry;
use thermomatic_server::server::Server;
use thermomatic_server::web;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Thermomatic - telemetry ingest server for field devices
#[derive(Parser, Debug)]
#[command(name = "thermomatic")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "TCP telemetry ingest with an HTTP query surface", long_about = None)]
struct Args {
    /// TCP port devices connect to
    #[arg(long, default_value_t = 1337)]
    tcp_port: u16,

    /// HTTP port for the query surface
    #[arg(long, default_value_t = 1338)]
    http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    info!("starting thermomatic v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig {
        tcp_port: args.tcp_port,
        http_port: args.http_port,
        ..ServerConfig::default()
    };

    let registry = Arc::new(DeviceRegistry::new());
    let shutdown = CancellationToken::new();

    let server = Server::bind(config.clone(), Arc::clone(&registry)).await?;
    let query_listener = web::bind(config.http_port).await?;

    let ingest = tokio::spawn(server.run(shutdown.child_token()));
    let query = tokio::spawn(web::serve(
        query_listener,
        Arc::clone(&registry),
        shutdown.child_token(),
    ));

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = signal::ctrl_c() => info!("received ctrl+c, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    shutdown.cancel();
    ingest.await.context("ingest server task failed")?;
    query.await.context("query surface task failed")??;

    info!("shutdown complete");
    Ok(())
}

/// Setup logging with tracing
fn setup_logging(level: &str) {
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
