//! Application state shared across all request handlers.

use std::sync::Arc;
use xmrchat_core::broadcaster::Broadcaster;
use xmrchat_core::monitor::PaymentMonitor;
use xmrchat_core::wallet::MoneroWalletClient;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Wallet RPC client, also owned (as a clone) by the monitor.
    pub wallet: MoneroWalletClient,
    /// The reconciliation state machine.
    pub monitor: Arc<PaymentMonitor<MoneroWalletClient>>,
    /// Topic fan-out for confirmation events.
    pub broadcaster: Broadcaster,
}
