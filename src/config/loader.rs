//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml
//! structure. Secrets (API keys) may also arrive via environment variables,
//! which take precedence over file values.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::{ChainFamily, ChainId, SwapperName};

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineSection,
    pub wallet: WalletSection,
    /// Keyed by swapper name (`thorchain`, `cow_swap`, `zero_ex`, `osmosis`,
    /// `li_fi`); BTreeMap keeps iteration deterministic
    pub providers: BTreeMap<String, ProviderEntry>,
    pub logging: LoggingSection,
}

/// Engine configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Default slippage tolerance in basis points (0.5% = 50 bps)
    pub default_slippage_bps: u16,
    /// Affiliate fee applied to quotes, basis points
    pub affiliate_bps: u16,
    /// Delay between confirmation polls, milliseconds
    pub poll_interval_ms: u64,
    /// Confirmation polls before a hop is declared timed out
    pub max_poll_attempts: u32,
}

/// Wallet configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct WalletSection {
    /// Chain ids quoting and execution may touch
    pub supported_chains: Vec<String>,
    /// Whether the wallet supports the fee-bump (EIP-1559 style) mechanism
    #[serde(default)]
    pub supports_fee_bump: bool,
}

impl WalletSection {
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.supported_chains
            .iter()
            .map(|c| ChainId::from(c.as_str()))
            .collect()
    }
}

/// Per-provider configuration entry
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: String,
    /// Optional API key for higher rate limits
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderEntry {
    /// Get base URL with environment variable override.
    /// Checks PORTAGE_<NAME>_URL first, falls back to the config value.
    pub fn base_url_with_env(&self, key: &str) -> String {
        let var = format!("PORTAGE_{}_URL", key.to_uppercase());
        std::env::var(var).unwrap_or_else(|_| self.base_url.clone())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log to file (in addition to stdout)
    #[serde(default)]
    pub log_to_file: bool,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.default_slippage_bps >= 10_000 {
            return Err(ConfigError::ValidationError(format!(
                "default_slippage_bps must be < 10000, got {}",
                self.engine.default_slippage_bps
            )));
        }

        if self.engine.max_poll_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_poll_attempts must be > 0".to_string(),
            ));
        }

        for chain in &self.wallet.supported_chains {
            let chain_id = ChainId::from(chain.as_str());
            if ChainFamily::of(&chain_id).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "supported chain {} has no known protocol family",
                    chain
                )));
            }
        }

        let mut any_enabled = false;
        for (key, entry) in &self.providers {
            if SwapperName::parse(key).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "unknown provider: {}",
                    key
                )));
            }
            if entry.enabled {
                any_enabled = true;
                if entry.base_url.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "provider {} is enabled but has no base_url",
                        key
                    )));
                }
            }
        }
        if !any_enabled {
            return Err(ConfigError::ValidationError(
                "no providers enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Enabled providers with their entries, in swapper enumeration order
    pub fn enabled_providers(&self) -> Vec<(SwapperName, String, ProviderEntry)> {
        let mut out = Vec::new();
        for name in SwapperName::ALL {
            for (key, entry) in &self.providers {
                if entry.enabled && SwapperName::parse(key) == Some(name) {
                    out.push((name, key.clone(), entry.clone()));
                }
            }
        }
        out
    }
}
