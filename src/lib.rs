//! Portage - Cross-Chain Swap Route Aggregation and Execution Engine
//!
//! Fans a quote request out to independent swap providers, ranks the results
//! into a single best executable route, and drives that route hop by hop
//! through signing, broadcast, and confirmation across protocol families.
//!
//! # Modules
//!
//! - `domain`: Pure types and logic (assets, routes, ranking, validation)
//! - `ports`: Trait boundaries (QuoteProvider, WalletPort) and test mocks
//! - `adapters`: External implementations (provider HTTP client, chain
//!   signers, CLI)
//! - `application`: Session state, quote aggregator, hop executor
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
