//! Gateway to the external monero-wallet-rpc daemon.
//!
//! The [`WalletRpc`] trait is the narrow capability the rest of the
//! system depends on: mint a receiving address bound to a payment id,
//! list incoming transfers, report a balance. The concrete
//! [`MoneroWalletClient`] talks JSON-RPC 2.0 over HTTP; the monitor only
//! ever sees typed outcomes, so a wallet outage degrades to a skipped
//! reconciliation cycle instead of a crash.

mod rpc;

pub use rpc::{MoneroWalletClient, WalletRpcConfig};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors surfaced by wallet RPC calls.
///
/// Every call can fail independently and transiently (network blip,
/// wallet resyncing), so failures are typed outcomes the caller applies
/// its own retry/skip policy to.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The wallet RPC endpoint was unreachable or the call timed out.
    #[error("wallet rpc unavailable: {0}")]
    Unavailable(String),

    /// The wallet responded, but not with the shape we expect.
    #[error("wallet rpc protocol error: {0}")]
    Protocol(String),
}

/// A wallet-generated receiving address with its embedded payment id.
#[derive(Debug, Clone)]
pub struct IntegratedAddress {
    pub address: String,
    pub payment_id: String,
}

/// One incoming transfer as reported by the wallet.
///
/// Ephemeral: re-fetched every poll, never persisted beyond the
/// monitor's processed-txid set.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Transaction id, globally unique per transfer.
    pub txid: String,
    /// Payment id the sending wallet attached, if any.
    pub payment_id: String,
    /// Transferred amount in XMR (normalized from atomic units).
    pub amount: Decimal,
    /// Blocks mined atop the containing block. Zero for pool transfers.
    pub confirmations: u64,
    /// Wallet-reported time of the transfer.
    pub timestamp: OffsetDateTime,
}

/// Wallet balance in XMR.
#[derive(Debug, Clone, Copy)]
pub struct Balance {
    pub balance: Decimal,
    pub unlocked_balance: Decimal,
}

/// The wallet capability the monitor and the request handlers consume.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// Request a receiving address from the wallet. When `payment_id` is
    /// `None` the wallet mints a fresh one.
    async fn create_integrated_address(
        &self,
        payment_id: Option<&str>,
    ) -> Result<IntegratedAddress, WalletError>;

    /// List all currently known incoming transfers, confirmed and pooled.
    async fn incoming_transfers(&self) -> Result<Vec<Transfer>, WalletError>;

    /// Fetch the wallet balance.
    async fn balance(&self) -> Result<Balance, WalletError>;

    /// Liveness probe. Never fails: any balance error maps to `false`.
    async fn check_liveness(&self) -> bool {
        self.balance().await.is_ok()
    }
}

#[async_trait]
impl<W: WalletRpc + ?Sized> WalletRpc for std::sync::Arc<W> {
    async fn create_integrated_address(
        &self,
        payment_id: Option<&str>,
    ) -> Result<IntegratedAddress, WalletError> {
        (**self).create_integrated_address(payment_id).await
    }

    async fn incoming_transfers(&self) -> Result<Vec<Transfer>, WalletError> {
        (**self).incoming_transfers().await
    }

    async fn balance(&self) -> Result<Balance, WalletError> {
        (**self).balance().await
    }
}
