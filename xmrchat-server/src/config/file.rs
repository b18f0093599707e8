//! TOML file configuration structures.
//!
//! These structs directly map to the `xmrchat-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub wallet: WalletSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default address")
}

/// monero-wallet-rpc connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSection {
    /// Base URL of the wallet RPC daemon, without port.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Optional RPC credentials; both must be set or neither.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout for wallet RPC calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WalletSection {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            rpc_port: default_rpc_port(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    18082
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Payment monitor section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Confirmations required before a payment settles.
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u64,
    /// Seconds a pending payment may wait before being dropped.
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            min_confirmations: default_min_confirmations(),
            expiry_secs: default_expiry_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_min_confirmations() -> u64 {
    1
}

fn default_expiry_secs() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[wallet]
rpc_url = "http://wallet.internal"
rpc_port = 18082
username = "rpcuser"
password = "rpcpass"
request_timeout_secs = 5

[monitor]
poll_interval_secs = 15
min_confirmations = 2
expiry_secs = 1800
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.wallet.rpc_url, "http://wallet.internal");
        assert_eq!(config.wallet.username.as_deref(), Some("rpcuser"));
        assert_eq!(config.monitor.min_confirmations, 2);
        assert_eq!(config.monitor.expiry_secs, 1800);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.wallet.rpc_url, "http://127.0.0.1");
        assert_eq!(config.wallet.rpc_port, 18082);
        assert!(config.wallet.username.is_none());
        assert_eq!(config.monitor.poll_interval_secs, 10);
        assert_eq!(config.monitor.min_confirmations, 1);
        assert_eq!(config.monitor.expiry_secs, 3600);
    }
}
