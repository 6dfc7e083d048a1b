//! Configuration management for the transaction resubmitter
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::tx::classify::{ErrorMessagesConfig, ErrorTable};
use crate::tx::ControlParams;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "TX_RESUBMITTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub sender: SenderConfig,
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub errors: ErrorMessagesConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Submission control knobs
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    pub polling_interval_ms: u64,
    pub max_retries: u32,
    pub expected_timeout_secs: u64,
    pub unexpected_timeout_secs: u64,
    #[serde(default)]
    pub nonce_immutable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_urls: Vec<String>,
    /// Resolved from the node when absent
    pub chain_id: Option<u64>,
    /// Upper bound applied to node gas price suggestions
    pub max_gas_price_gwei: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: Option<String>,
    pub keystore_path: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus text exposition written here at exit
    pub textfile_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl SenderConfig {
    pub fn control_params(&self) -> ControlParams {
        ControlParams {
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            max_retries: self.max_retries,
            expected_timeout: Duration::from_secs(self.expected_timeout_secs),
            unexpected_timeout: Duration::from_secs(self.unexpected_timeout_secs),
            nonce_immutable: self.nonce_immutable,
        }
    }
}

impl Settings {
    /// Load settings from `path`, the config env variable, or the default file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
        });

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("No RPC URLs configured");
        }

        if self.sender.polling_interval_ms == 0 {
            anyhow::bail!("polling_interval_ms must be greater than zero");
        }

        if self.wallet.private_key_env.is_none() && self.wallet.keystore_path.is_none() {
            anyhow::bail!("Wallet needs private_key_env or keystore_path");
        }

        Ok(())
    }

    /// Settings that load but are probably a mistake; logged once logging is up
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.sender.expected_timeout_secs == 0 {
            warnings.push(
                "expected_timeout_secs is 0 - confirmations will never be observed".to_string(),
            );
        }
        if self.sender.max_retries == 0 {
            warnings.push("max_retries is 0 - stuck transactions will not be re-priced".to_string());
        }
        warnings
    }

    pub fn error_table(&self) -> ErrorTable {
        ErrorTable::from(&self.errors)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid placeholder regex");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
