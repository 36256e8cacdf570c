//! sensord - hardware telemetry IPC server.
//!
//! This binary binds the telemetry session server to a local Unix socket
//! and serves CPU, memory, and GPU snapshots to connecting clients until
//! interrupted.

use anyhow::Result;
use clap::Parser;
use sensord_core::{ServerConfig, SystemTelemetry, TelemetryServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sensord")]
#[command(about = "Hardware telemetry IPC server")]
struct Args {
    /// Socket path to bind (defaults to sensord.sock in the system temp dir)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Idle seconds before an unused session is closed
    #[arg(long, default_value = "65")]
    idle_timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting sensord");

    let mut config = match args.socket {
        Some(path) => ServerConfig::new(path),
        None => ServerConfig::default(),
    };
    config = config.with_idle_timeout(Duration::from_secs(args.idle_timeout));

    let provider = Arc::new(SystemTelemetry::new());
    let mut server = TelemetryServer::new(provider, config);
    server.start().await?;

    // Print the endpoint for clients to read (intentional stdout)
    println!("SENSORD_SOCKET={}", server.socket_path().display());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server");
    server.stop().await;

    Ok(())
}
