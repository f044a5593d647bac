//! Quote Requests and Request-Level Validation
//!
//! A single precondition pass runs before any provider is contacted: if the
//! request itself cannot be serviced there is one top-level error instead of
//! N identical per-provider failures.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::asset::{AssetId, ChainId};

/// Wallet feature flags that change how providers quote and how transactions
/// are built (e.g. EIP-1559 style fee bumping on EVM chains)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCapabilities {
    pub supports_fee_bump: bool,
}

/// The user's desired conversion. Immutable once issued; a changed request is
/// a new request and resets all aggregated quote state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub sell_asset: AssetId,
    pub buy_asset: AssetId,
    /// Base units of the sell asset
    pub sell_amount: u128,
    pub account_number: u32,
    pub receive_address: String,
    pub send_address: String,
    pub capabilities: WalletCapabilities,
}

impl QuoteRequest {
    /// Whether two requests describe the same trade. Address or capability
    /// changes alone do not invalidate pinned route selections; asset,
    /// amount, or account changes do.
    pub fn same_trade(&self, other: &QuoteRequest) -> bool {
        self.sell_asset == other.sell_asset
            && self.buy_asset == other.buy_asset
            && self.sell_amount == other.sell_amount
            && self.account_number == other.account_number
    }
}

/// Fatal, request-level failures. Any of these short-circuits provider
/// fan-out entirely.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestValidationError {
    #[error("no wallet connected")]
    WalletNotConnected,

    #[error("chain not supported: {0}")]
    UnsupportedChain(ChainId),

    #[error("sell amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient balance: need {required} base units, have {available}")]
    InsufficientBalance { required: u128, available: u128 },
}

/// Host-supplied facts the precondition check runs against. Balance and
/// wallet state are owned by the host application, not the engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub wallet_connected: bool,
    pub supported_chains: HashSet<ChainId>,
    /// Spendable balance of the sell asset, base units
    pub sell_asset_balance: u128,
}

impl RequestContext {
    /// Context that passes every check for the given chains. Used by paper
    /// trading and tests where the host has no balance source.
    pub fn permissive(chains: impl IntoIterator<Item = ChainId>) -> Self {
        Self {
            wallet_connected: true,
            supported_chains: chains.into_iter().collect(),
            sell_asset_balance: u128::MAX,
        }
    }
}

/// Run the request-level precondition pass
pub fn validate_request(
    request: &QuoteRequest,
    ctx: &RequestContext,
) -> Result<(), RequestValidationError> {
    if !ctx.wallet_connected {
        return Err(RequestValidationError::WalletNotConnected);
    }

    for chain in [&request.sell_asset.chain_id, &request.buy_asset.chain_id] {
        if !ctx.supported_chains.contains(chain) {
            return Err(RequestValidationError::UnsupportedChain(chain.clone()));
        }
    }

    if request.sell_amount == 0 {
        return Err(RequestValidationError::InvalidAmount);
    }

    if ctx.sell_asset_balance < request.sell_amount {
        return Err(RequestValidationError::InsufficientBalance {
            required: request.sell_amount,
            available: ctx.sell_asset_balance,
        });
    }

    Ok(())
}
