use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::Path};

use alloy::primitives::Address;
use anyhow::Context;
use dotenv::dotenv;
use envsubst::substitute;
use serde::Deserialize;

/// Environment variable prefixes that may be interpolated into the YAML file.
const ENV_PREFIXES: [&str; 4] = ["SERVER_", "RPC_", "WALLET_", "DEX_"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub multicall: MulticallConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
}

impl Config {
    pub async fn from_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenv().ok();

        let path = path.as_ref();
        let file_content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file from path: {}", path.display()))?;

        let env_vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
            .collect();

        let interpolated = substitute(&file_content, &env_vars)
            .context("failed to substitute environment variables in YAML")?;

        let config: Config =
            serde_yaml::from_str(&interpolated).context("failed to parse YAML configuration")?;

        Ok(config)
    }

    pub fn server_uri(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: u64,
    #[serde(default = "default_block_poll_interval_ms")]
    pub block_poll_interval_ms: u64,
}

impl RpcConfig {
    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub private_key: String,
    /// Account to follow when no private key is configured.
    #[serde(default)]
    pub watch_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MulticallConfig {
    /// Multicall3 deployment. Without it every read is issued on its own.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_blocks_per_fetch")]
    pub blocks_per_fetch: u64,
    #[serde(default = "default_max_calls_per_batch")]
    pub max_calls_per_batch: usize,
}

impl Default for MulticallConfig {
    fn default() -> Self {
        Self {
            address: None,
            blocks_per_fetch: default_blocks_per_fetch(),
            max_calls_per_batch: default_max_calls_per_batch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_recent_window_secs")]
    pub recent_window_secs: u64,
    /// Extra gas added on top of estimates, in basis points.
    #[serde(default = "default_gas_margin_bps")]
    pub gas_margin_bps: u64,
    /// Fixed gas price for writes. The network rejects anything else.
    #[serde(default)]
    pub gas_price_gwei: Option<u64>,
}

impl TransactionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recent_window_secs as i64)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            recent_window_secs: default_recent_window_secs(),
            gas_margin_bps: default_gas_margin_bps(),
            gas_price_gwei: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub airdrop: Option<String>,
    #[serde(default)]
    pub jacuzzi: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub yay: Option<String>,
    /// Wrapped AVAX, the quote side of the YAY price.
    #[serde(default)]
    pub wavax: Option<String>,
    /// WAVAX/YAY pair the YAY price is read from.
    #[serde(default)]
    pub yay_avax_pair: Option<String>,
}

/// Parses an optional address from config.
///
/// Blank values and placeholders left behind by a missing environment variable
/// resolve to `None` so the dependent feature is simply unavailable.
pub fn parse_optional_address(field: &str, value: Option<&str>) -> Option<Address> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    match Address::from_str(raw) {
        Ok(address) => Some(address),
        Err(e) => {
            tracing::warn!("Ignoring invalid address for {field} ({raw}): {e}");
            None
        }
    }
}

fn default_block_poll_interval_ms() -> u64 {
    2_000
}

fn default_blocks_per_fetch() -> u64 {
    1
}

fn default_max_calls_per_batch() -> usize {
    500
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_recent_window_secs() -> u64 {
    30 * 60
}

fn default_gas_margin_bps() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[serial_test::serial]
    async fn test_load_config_from_yaml() {
        let config = Config::from_yaml("config/test.yaml").await.unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rpc.chain_id, 43114);
        assert_eq!(config.wallet.private_key, "");
        assert_eq!(config.transactions.gas_price_gwei, Some(225));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_missing_sections_fall_back_to_defaults() {
        let config = Config::from_yaml("config/test.yaml").await.unwrap();

        assert_eq!(config.rpc.block_poll_interval_ms, 2_000);
        assert_eq!(config.multicall.blocks_per_fetch, 1);
        assert_eq!(config.multicall.max_calls_per_batch, 500);
        assert_eq!(config.transactions.recent_window_secs, 1_800);
        assert_eq!(config.transactions.gas_margin_bps, 1_000);
        assert!(config.wallet.watch_address.is_none());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_config_with_env_vars() {
        unsafe {
            std::env::set_var(
                "DEX_JACUZZI_ADDRESS",
                "0x1111111111111111111111111111111111111111",
            );
        }

        let config = Config::from_yaml("config/test.yaml").await.unwrap();
        let jacuzzi =
            parse_optional_address("contracts.jacuzzi", config.contracts.jacuzzi.as_deref());
        assert_eq!(
            jacuzzi,
            Some(Address::from_str("0x1111111111111111111111111111111111111111").unwrap())
        );

        unsafe {
            std::env::remove_var("DEX_JACUZZI_ADDRESS");
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_unset_env_placeholder_resolves_to_none() {
        unsafe {
            std::env::remove_var("DEX_JACUZZI_ADDRESS");
        }

        let config = Config::from_yaml("config/test.yaml").await.unwrap();
        let jacuzzi =
            parse_optional_address("contracts.jacuzzi", config.contracts.jacuzzi.as_deref());
        assert!(jacuzzi.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = Config::from_yaml("config/does-not-exist.yaml").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_server_uri() {
        let config: Config = serde_yaml::from_str(
            "server: {host: \"127.0.0.1\", port: 9000}\nrpc: {url: \"http://localhost:8545\", chain_id: 31337}\n",
        )
        .unwrap();
        assert_eq!(config.server_uri(), "127.0.0.1:9000");
        assert!(config.multicall.address.is_none());
    }
}
