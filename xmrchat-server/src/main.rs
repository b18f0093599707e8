//! XMR Superchat Server
//!
//! Watches a monero-wallet-rpc daemon for incoming superchat payments
//! and pushes confirmation events to WebSocket subscribers per video.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use xmrchat_core::broadcaster::Broadcaster;
use xmrchat_core::events::confirmed_payment_channel;
use xmrchat_core::monitor::PaymentMonitor;
use xmrchat_core::wallet::{MoneroWalletClient, WalletRpc};

/// XMR Superchat - Monero payment monitor for video superchats
#[derive(Parser, Debug)]
#[command(name = "xmrchat-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./xmrchat-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting xmrchat-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded_config.listen;
    let poll_interval = loaded_config.poll_interval;

    // Reloadable sections live behind their own locks
    let wallet_config = Arc::new(RwLock::new(loaded_config.wallet));
    let monitor_settings = Arc::new(RwLock::new(loaded_config.monitor));

    // Wire the pipeline: wallet -> monitor -> broadcaster
    let wallet = MoneroWalletClient::new(Arc::clone(&wallet_config));
    let (confirmed_tx, confirmed_rx) = confirmed_payment_channel();
    let monitor = Arc::new(PaymentMonitor::new(
        wallet.clone(),
        Arc::clone(&monitor_settings),
        confirmed_tx,
    ));
    let broadcaster = Broadcaster::new();

    let (broadcast_shutdown_tx, broadcast_shutdown_rx) = watch::channel(false);
    let broadcaster_handle =
        tokio::spawn(broadcaster.clone().run(confirmed_rx, broadcast_shutdown_rx));

    if wallet.check_liveness().await {
        tracing::info!("Wallet RPC connected successfully");
    } else {
        // Not fatal: the monitor retries every cycle.
        tracing::error!("Wallet RPC is not accessible");
    }

    monitor.start_monitoring(poll_interval).await;

    // Create application state
    let state = AppState {
        wallet,
        monitor: Arc::clone(&monitor),
        broadcaster,
    };

    // Spawn config reload handler (listens for SIGHUP)
    let reload_shutdown = spawn_config_reload_handler(
        config_loader,
        wallet_config,
        monitor_settings,
    );

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Tear down background tasks
    monitor.stop_monitoring().await;
    let _ = broadcast_shutdown_tx.send(true);
    let _ = broadcaster_handle.await;
    reload_shutdown.notify_one();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
