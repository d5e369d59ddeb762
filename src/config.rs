//! Configuration management for the cross-domain relayer
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Network addresses and chain ids are always supplied here, never compiled in.

use crate::fees::GasOverridePolicy;
use crate::message::Direction;
use crate::tracker::PollConfig;

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "BRIDGE_CONFIG";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern compiles");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    pub network: NetworkConfig,
    pub chains: ChainsConfig,
    #[serde(default)]
    pub fees: GasOverridePolicy,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

/// Polling, retry and submission tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_initial_interval_ms: u64,
    pub poll_max_interval_ms: u64,
    /// Transient poll errors tolerated per `await_status` call
    pub poll_error_budget: u32,
    pub inclusion_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub gas_limit_buffer_percent: u64,
    pub max_priority_fee_gwei: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_initial_interval_ms: 2_000,
            poll_max_interval_ms: 30_000,
            poll_error_budget: 10,
            inclusion_timeout_secs: 300,
            max_retries: 3,
            retry_delay_ms: 1_000,
            gas_limit_buffer_percent: 20,
            max_priority_fee_gwei: 2,
        }
    }
}

impl EngineConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(self.poll_initial_interval_ms),
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
            error_budget: self.poll_error_budget,
        }
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_secs(self.inclusion_timeout_secs)
    }
}

/// Rollup deployment the engine talks to
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub l1_chain_id: u64,
    pub l2_chain_id: u64,
    pub bridge: Address,
    pub inbox: Address,
    pub outbox: Address,
    pub rollup: Address,
    /// L1 blocks between an assertion and its confirmation
    pub confirm_period_blocks: u64,
    /// Fallback ticket lifetime when the chain cannot be asked
    #[serde(default = "default_retryable_lifetime")]
    pub retryable_lifetime_secs: u64,
}

fn default_retryable_lifetime() -> u64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    pub l1: ChainConfig,
    pub l2: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub max_gas_price_gwei: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    pub private_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// An origin transaction the daemon follows to completion
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub direction: Direction,
    pub tx_hash: B256,
    pub timeout_secs: u64,
    /// Execute withdrawals on L1 once confirmed
    #[serde(default)]
    pub execute: bool,
    /// Re-redeem tickets whose auto-redeem failed
    #[serde(default)]
    pub redeem: bool,
}

impl Settings {
    /// Load settings from the file named by `BRIDGE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        for (label, chain, expected) in [
            ("l1", &self.chains.l1, self.network.l1_chain_id),
            ("l2", &self.chains.l2, self.network.l2_chain_id),
        ] {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", label);
            }
            if chain.chain_id != expected {
                anyhow::bail!(
                    "Chain {} has id {} but the network expects {}",
                    label,
                    chain.chain_id,
                    expected
                );
            }
        }

        if self.engine.poll_initial_interval_ms == 0 {
            anyhow::bail!("poll_initial_interval_ms must be positive");
        }
        if self.engine.poll_initial_interval_ms > self.engine.poll_max_interval_ms {
            anyhow::bail!("poll_initial_interval_ms exceeds poll_max_interval_ms");
        }

        for entry in &self.watch {
            if entry.timeout_secs == 0 {
                anyhow::bail!("watch entry {} has no timeout", entry.tx_hash);
            }
            if entry.execute && entry.direction != Direction::L2ToL1 {
                anyhow::bail!("watch entry {}: only withdrawals can be executed", entry.tx_hash);
            }
            if entry.redeem && entry.direction != Direction::L1ToL2 {
                anyhow::bail!("watch entry {}: only retryables can be redeemed", entry.tx_hash);
            }
        }

        if !self.watch.is_empty() && self.wallet.private_key_env.is_none() {
            let needs_wallet = self.watch.iter().any(|w| w.execute || w.redeem);
            if needs_wallet {
                tracing::warn!("Watch entries request transactions but no wallet is configured");
            }
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
