//! JSON-RPC 2.0 client for monero-wallet-rpc.
//!
//! Methods used: `make_integrated_address`, `get_transfers`,
//! `get_balance`. Responses are deserialized into typed structs before
//! use; a missing `result`, an `error` member or a shape mismatch is a
//! [`WalletError::Protocol`], transport failures and timeouts are
//! [`WalletError::Unavailable`].

use super::{Balance, IntegratedAddress, Transfer, WalletError, WalletRpc};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Atomic units (piconero) per XMR.
const PICONERO_PER_XMR: u64 = 1_000_000_000_000;

/// Connection parameters for the wallet RPC endpoint.
///
/// The client re-reads these on every call, so a config reload (e.g.
/// credential rotation via SIGHUP) takes effect without rebuilding the
/// client or the monitor that owns it.
#[derive(Debug, Clone)]
pub struct WalletRpcConfig {
    /// Base URL without port, e.g. `http://127.0.0.1`.
    pub rpc_url: String,
    pub rpc_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout so a hung upstream cannot stall cycles.
    pub request_timeout: Duration,
}

impl WalletRpcConfig {
    fn endpoint(&self) -> String {
        format!("{}:{}/json_rpc", self.rpc_url, self.rpc_port)
    }
}

/// HTTP client for monero-wallet-rpc.
#[derive(Clone)]
pub struct MoneroWalletClient {
    http: reqwest::Client,
    config: Arc<RwLock<WalletRpcConfig>>,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<P>,
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorDetail>,
}

#[derive(Deserialize)]
struct RpcErrorDetail {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct MakeIntegratedAddressParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MakeIntegratedAddressResult {
    integrated_address: String,
    payment_id: String,
}

#[derive(Serialize)]
struct GetTransfersParams {
    #[serde(rename = "in")]
    incoming: bool,
    pending: bool,
    pool: bool,
    filter_by_height: bool,
}

#[derive(Debug, Deserialize)]
struct GetTransfersResult {
    #[serde(rename = "in", default)]
    incoming: Vec<RawTransfer>,
    #[serde(default)]
    pool: Vec<RawTransfer>,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    txid: String,
    #[serde(default)]
    payment_id: String,
    /// Amount in atomic units (piconero).
    amount: u64,
    /// Absent for pool transfers; they have zero confirmations.
    #[serde(default)]
    confirmations: u64,
    /// Unix timestamp in seconds.
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct GetBalanceResult {
    balance: u64,
    unlocked_balance: u64,
}

impl MoneroWalletClient {
    /// Create a client reading its endpoint and credentials from the
    /// given shared config.
    pub fn new(config: Arc<RwLock<WalletRpcConfig>>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R, WalletError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let (endpoint, auth, timeout) = {
            let config = self.config.read().await;
            let auth = match (&config.username, &config.password) {
                (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
                _ => None,
            };
            (config.endpoint(), auth, config.request_timeout)
        };

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        };

        let mut builder = self.http.post(&endpoint).timeout(timeout).json(&request);
        if let Some((user, pass)) = auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;

        let envelope: RpcEnvelope<R> = response.json().await.map_err(|e| {
            if e.is_decode() {
                WalletError::Protocol(e.to_string())
            } else {
                WalletError::Unavailable(e.to_string())
            }
        })?;

        unwrap_envelope(envelope, method)
    }
}

#[async_trait]
impl WalletRpc for MoneroWalletClient {
    async fn create_integrated_address(
        &self,
        payment_id: Option<&str>,
    ) -> Result<IntegratedAddress, WalletError> {
        let result: MakeIntegratedAddressResult = self
            .call(
                "make_integrated_address",
                Some(MakeIntegratedAddressParams { payment_id }),
            )
            .await?;

        Ok(IntegratedAddress {
            address: result.integrated_address,
            payment_id: result.payment_id,
        })
    }

    async fn incoming_transfers(&self) -> Result<Vec<Transfer>, WalletError> {
        let result: GetTransfersResult = self
            .call(
                "get_transfers",
                Some(GetTransfersParams {
                    incoming: true,
                    pending: false,
                    pool: true,
                    filter_by_height: false,
                }),
            )
            .await?;

        normalize_transfers(result)
    }

    async fn balance(&self) -> Result<Balance, WalletError> {
        let result: GetBalanceResult = self.call("get_balance", None::<()>).await?;

        Ok(Balance {
            balance: from_atomic(result.balance),
            unlocked_balance: from_atomic(result.unlocked_balance),
        })
    }
}

/// Extract the `result` member, mapping RPC-level errors to `Protocol`.
fn unwrap_envelope<T>(envelope: RpcEnvelope<T>, method: &str) -> Result<T, WalletError> {
    if let Some(error) = envelope.error {
        return Err(WalletError::Protocol(format!(
            "{method} failed with code {}: {}",
            error.code, error.message
        )));
    }
    envelope
        .result
        .ok_or_else(|| WalletError::Protocol(format!("missing result for {method}")))
}

/// Convert an atomic-unit amount to XMR.
fn from_atomic(amount: u64) -> Decimal {
    Decimal::from(amount) / Decimal::from(PICONERO_PER_XMR)
}

/// Flatten confirmed and pooled transfers into the wallet report order
/// and normalize amounts and timestamps.
fn normalize_transfers(result: GetTransfersResult) -> Result<Vec<Transfer>, WalletError> {
    result
        .incoming
        .into_iter()
        .chain(result.pool)
        .map(|raw| {
            let timestamp = OffsetDateTime::from_unix_timestamp(raw.timestamp)
                .map_err(|e| WalletError::Protocol(format!("bad transfer timestamp: {e}")))?;
            Ok(Transfer {
                txid: raw.txid,
                payment_id: raw.payment_id,
                amount: from_atomic(raw.amount),
                confirmations: raw.confirmations,
                timestamp,
            })
        })
        .collect()
}
