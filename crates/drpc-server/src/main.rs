//! dRPC Server - control plane endpoint for storage engine notifications.
//!
//! Listens on `daos_server.sock` in the socket directory and handles calls
//! to the `Server` module until interrupted.

mod srv;

use anyhow::{Context, Result};
use clap::Parser;
use drpc_core::{cleanup_sockets, server_socket_path, DomainSocketServer, SocketConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "drpc-server")]
#[command(about = "dRPC server for storage engine notifications")]
struct Args {
    /// Directory holding the server and engine sockets
    #[arg(long, default_value = SocketConfig::DEFAULT_SOCKET_DIR)]
    socket_dir: PathBuf,

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

    info!("Starting dRPC server");

    // Clean up any previous execution's sockets before creating new ones
    cleanup_sockets(&args.socket_dir)?;

    let mut server = DomainSocketServer::new(server_socket_path(&args.socket_dir))
        .context("unable to create socket server")?;
    server.register_module(srv::SrvModule::new())?;
    server.start().context("unable to start socket server")?;

    info!("dRPC server running on {}", server.socket_path().display());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    server.shutdown();
    server.wait_stopped().await;

    Ok(())
}
