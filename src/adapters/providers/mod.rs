//! Provider Registry
//!
//! The closed set of enabled swappers, each identity bound to a contract
//! implementation at construction time. There is no dynamic plugin loading:
//! a provider exists here or it does not exist at all.

pub mod http;

pub use http::{HttpQuoteProvider, ProviderConfig};

use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::domain::SwapperName;
use crate::ports::quote_provider::QuoteProvider;

/// Registry of enabled providers, held in swapper enumeration order
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn QuoteProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Builder method to register a provider. A later registration for the
    /// same swapper replaces the earlier one.
    pub fn with_provider(mut self, provider: Arc<dyn QuoteProvider>) -> Self {
        self.providers.retain(|p| p.name() != provider.name());
        self.providers.push(provider);
        self.providers.sort_by_key(|p| p.name());
        self
    }

    /// Bind every enabled provider from config to an HTTP adapter
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (name, key, entry) in config.enabled_providers() {
            let provider = HttpQuoteProvider::new(
                name,
                ProviderConfig {
                    base_url: entry.base_url_with_env(&key),
                    api_key: entry.api_key.clone(),
                    ..ProviderConfig::default()
                },
            )
            .map_err(|e| ConfigError::ValidationError(format!("provider {}: {}", key, e)))?;
            registry = registry.with_provider(Arc::new(provider));
        }
        Ok(registry)
    }

    /// Enabled providers, in swapper enumeration order
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<dyn QuoteProvider>> {
        self.providers.iter()
    }

    pub fn get(&self, name: SwapperName) -> Option<Arc<dyn QuoteProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<SwapperName> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
