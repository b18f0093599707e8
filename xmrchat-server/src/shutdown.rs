//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, RwLock};
use xmrchat_core::monitor::MonitorSettings;
use xmrchat_core::wallet::WalletRpcConfig;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Wallet RPC credentials and monitor thresholds are swapped in place;
/// the listen address and poll interval require a restart. Returns a
/// Notify used to stop the handler during shutdown.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    wallet_config: Arc<RwLock<WalletRpcConfig>>,
    monitor_settings: Arc<RwLock<MonitorSettings>>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => {
                            *wallet_config.write().await = loaded.wallet;
                            *monitor_settings.write().await = loaded.monitor;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
