//! Configuration module for xmrchat-server.
//!
//! Handles loading configuration from the TOML file and CLI arguments,
//! and converting it into the runtime types the core consumes. The
//! loader is kept around so a SIGHUP can re-read the file (credential
//! rotation without restart).

pub mod file;

use crate::config::file::FileConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use xmrchat_core::monitor::MonitorSettings;
use xmrchat_core::wallet::WalletRpcConfig;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Validated runtime configuration.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub wallet: WalletRpcConfig,
    pub monitor: MonitorSettings,
    /// Interval between reconciliation cycles. Changing it requires a
    /// restart; thresholds and credentials reload live.
    pub poll_interval: Duration,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, validate and convert the configuration.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let rpc_url = url::Url::parse(&config.wallet.rpc_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "wallet.rpc_url {:?} is not a valid URL: {e}",
                config.wallet.rpc_url
            ))
        })?;
        if !matches!(rpc_url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "wallet.rpc_url must use http or https, got {:?}",
                rpc_url.scheme()
            )));
        }

        if config.wallet.username.is_some() != config.wallet.password.is_some() {
            return Err(ConfigError::ValidationError(
                "wallet.username and wallet.password must be set together".to_string(),
            ));
        }

        if config.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if config.wallet.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "wallet.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        listen: file_config.server.listen,
        wallet: WalletRpcConfig {
            rpc_url: file_config.wallet.rpc_url.trim_end_matches('/').to_string(),
            rpc_port: file_config.wallet.rpc_port,
            username: file_config.wallet.username,
            password: file_config.wallet.password,
            request_timeout: Duration::from_secs(file_config.wallet.request_timeout_secs),
        },
        monitor: MonitorSettings {
            min_confirmations: file_config.monitor.min_confirmations,
            expiry: Duration::from_secs(file_config.monitor.expiry_secs),
        },
        poll_interval: Duration::from_secs(file_config.monitor.poll_interval_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::{MonitorSection, ServerSection, WalletSection};

    fn config_with_wallet(wallet: WalletSection) -> FileConfig {
        FileConfig {
            server: ServerSection::default(),
            wallet,
            monitor: MonitorSection::default(),
        }
    }

    #[test]
    fn rejects_credentials_set_separately() {
        let loader = ConfigLoader::new("/dev/null", None);
        let config = config_with_wallet(WalletSection {
            username: Some("rpcuser".into()),
            ..WalletSection::default()
        });
        assert!(matches!(
            loader.validate(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_non_http_rpc_url() {
        let loader = ConfigLoader::new("/dev/null", None);
        let config = config_with_wallet(WalletSection {
            rpc_url: "ftp://wallet".into(),
            ..WalletSection::default()
        });
        assert!(matches!(
            loader.validate(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn strips_trailing_slash_from_rpc_url() {
        let config = config_with_wallet(WalletSection {
            rpc_url: "http://wallet.internal/".into(),
            ..WalletSection::default()
        });
        let loaded = build_loaded_config(config);
        assert_eq!(loaded.wallet.rpc_url, "http://wallet.internal");
    }
}
