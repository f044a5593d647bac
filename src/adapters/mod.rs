//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Providers: the HTTP quote-provider client and the closed registry
//! - Chains: per-protocol-family signing/broadcast dispatch
//! - CLI: Command-line interface handlers

pub mod chains;
pub mod cli;
pub mod providers;

pub use chains::{adapter_for, resolve_family, ChainAdapter, ExecutionError};
pub use cli::CliApp;
pub use providers::{HttpQuoteProvider, ProviderConfig, ProviderRegistry};
