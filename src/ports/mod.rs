//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Quote providers (the swapper contract: quote, status, order submission)
//! - The wallet capability boundary (derive, sign, broadcast)
//!
//! `mocks` carries scripted implementations used by tests and paper mode.

pub mod mocks;
pub mod quote_provider;
pub mod wallet;

pub use quote_provider::{QuoteError, QuoteProvider, TradeStatus, TradeStatusKind};
pub use wallet::{
    CosmosTxRequest, EvmTxRequest, OrderMessage, SignedPayload, UnsignedTx, UtxoTxRequest,
    WalletError, WalletPort,
};
