//! Trade Routes and Hops
//!
//! A route is an executable conversion plan produced by one swapper: an
//! ordered, non-empty sequence of hops plus the overall rate and fee terms.
//! Amounts are integer base units; rates and tolerances are decimals.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::asset::AssetId;

/// Closed set of swapper identities the engine can quote against.
///
/// Declaration order is the deterministic enumeration order: it is the final
/// ranking tiebreak and the iteration order everywhere results must be stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SwapperName {
    Thorchain,
    CowSwap,
    ZeroEx,
    Osmosis,
    LiFi,
}

impl SwapperName {
    /// All swappers, in enumeration order
    pub const ALL: [SwapperName; 5] = [
        SwapperName::Thorchain,
        SwapperName::CowSwap,
        SwapperName::ZeroEx,
        SwapperName::Osmosis,
        SwapperName::LiFi,
    ];

    /// Providers that settle hops as off-chain signed orders submitted back
    /// to the provider, rather than broadcast transactions
    pub fn uses_offchain_orders(&self) -> bool {
        matches!(self, SwapperName::CowSwap)
    }

    pub fn parse(name: &str) -> Option<SwapperName> {
        match name {
            "thorchain" => Some(SwapperName::Thorchain),
            "cow_swap" | "cowswap" => Some(SwapperName::CowSwap),
            "zero_ex" | "zrx" => Some(SwapperName::ZeroEx),
            "osmosis" => Some(SwapperName::Osmosis),
            "li_fi" | "lifi" => Some(SwapperName::LiFi),
            _ => None,
        }
    }
}

impl fmt::Display for SwapperName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapperName::Thorchain => "Thorchain",
            SwapperName::CowSwap => "CoW Swap",
            SwapperName::ZeroEx => "0x",
            SwapperName::Osmosis => "Osmosis",
            SwapperName::LiFi => "LI.FI",
        };
        write!(f, "{}", s)
    }
}

/// Provider-assigned route identifier, unique per quote refresh
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A protocol fee taken in a specific asset, base units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFee {
    pub asset: AssetId,
    pub amount: u128,
}

/// Network fee for a hop, in base units of the sell-side fee asset
/// (the gas/fee asset of the chain the hop leaves from)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFee {
    pub asset: AssetId,
    pub amount: u128,
}

/// Fees attached to a single hop.
///
/// A missing network fee means the provider could not estimate it; the hop
/// is still executable but the gap is surfaced in the derived metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub network_fee: Option<NetworkFee>,
    pub protocol_fees: Vec<ProtocolFee>,
}

impl FeeData {
    pub fn network_only(asset: AssetId, amount: u128) -> Self {
        Self {
            network_fee: Some(NetworkFee { asset, amount }),
            protocol_fees: Vec::new(),
        }
    }

    /// Protocol fee charged in `asset`, zero when none is recorded
    pub fn protocol_fee_in(&self, asset: &AssetId) -> u128 {
        self.protocol_fees
            .iter()
            .filter(|f| &f.asset == asset)
            .map(|f| f.amount)
            .sum()
    }
}

/// Direction tag for hops that cross a bridge boundary. When present, the
/// output of this hop is not required to feed the next hop's sell asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeDirection {
    Deposit,
    Withdraw,
}

/// One atomic transfer within a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hop {
    pub sell_asset: AssetId,
    pub buy_asset: AssetId,
    pub account_number: u32,
    /// Amount leaving the wallet, protocol fees included, base units
    pub sell_amount_incl_fees: u128,
    pub buy_amount_before_fees: u128,
    pub buy_amount_after_fees: u128,
    pub fee_data: FeeData,
    /// Provider's estimate for this hop to settle, seconds
    pub estimated_execution_time_secs: u64,
    /// Swapper that produced and will settle this hop
    pub source: SwapperName,
    /// Contract that must be granted an allowance before this hop, if any
    pub allowance_contract: Option<String>,
    /// Provider vault/inbound address the sell-side transfer targets, if the
    /// hop settles via a deposit rather than a contract call
    pub deposit_address: Option<String>,
    /// Chain memo carried by the sell-side transfer (Cosmos memo, OP_RETURN)
    pub memo: Option<String>,
    pub bridge: Option<BridgeDirection>,
}

impl Hop {
    /// Same-chain bridge hop at a fixed rate of 1: before- and after-fee buy
    /// amounts both equal the sell amount. Mirrors how fixed-rate bridge
    /// providers quote these hops; whether slippage is truly impossible on
    /// that path is an assumption inherited from them.
    pub fn fixed_rate_bridge(
        sell_asset: AssetId,
        buy_asset: AssetId,
        account_number: u32,
        amount: u128,
        source: SwapperName,
    ) -> Self {
        Self {
            sell_asset,
            buy_asset,
            account_number,
            sell_amount_incl_fees: amount,
            buy_amount_before_fees: amount,
            buy_amount_after_fees: amount,
            fee_data: FeeData::default(),
            estimated_execution_time_secs: 0,
            source,
            allowance_contract: None,
            deposit_address: None,
            memo: None,
            bridge: Some(BridgeDirection::Deposit),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouteError {
    #[error("route has no hops")]
    EmptyHops,
    #[error("hop {0} output does not feed hop {1} input")]
    DiscontiguousHops(usize, usize),
}

/// A ranked, executable conversion plan composed of ordered hops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRoute {
    pub id: RouteId,
    pub hops: Vec<Hop>,
    /// Overall buy-per-sell rate quoted by the provider
    pub rate: Decimal,
    pub affiliate_bps: u16,
    /// Decimal fraction, e.g. 0.005 for 0.5%
    pub slippage_tolerance: Decimal,
    pub receive_address: String,
}

impl TradeRoute {
    /// Build a route, enforcing the hop contiguity invariant: each hop's buy
    /// asset must equal the next hop's sell asset unless the earlier hop
    /// carries an explicit bridge direction tag.
    pub fn try_new(
        id: RouteId,
        hops: Vec<Hop>,
        rate: Decimal,
        affiliate_bps: u16,
        slippage_tolerance: Decimal,
        receive_address: String,
    ) -> Result<Self, RouteError> {
        if hops.is_empty() {
            return Err(RouteError::EmptyHops);
        }
        for (i, pair) in hops.windows(2).enumerate() {
            if pair[0].bridge.is_none() && pair[0].buy_asset != pair[1].sell_asset {
                return Err(RouteError::DiscontiguousHops(i, i + 1));
            }
        }
        Ok(Self {
            id,
            hops,
            rate,
            affiliate_bps,
            slippage_tolerance,
            receive_address,
        })
    }

    /// Swapper that produced this route (all hops share one source)
    pub fn source(&self) -> SwapperName {
        self.hops[0].source
    }

    pub fn sell_asset(&self) -> &AssetId {
        &self.hops[0].sell_asset
    }

    pub fn buy_asset(&self) -> &AssetId {
        &self.hops[self.hops.len() - 1].buy_asset
    }

    /// Final buy amount after all fees, base units
    pub fn buy_amount_after_fees(&self) -> u128 {
        self.hops[self.hops.len() - 1].buy_amount_after_fees
    }

    /// Sum of per-hop execution time estimates, seconds
    pub fn total_estimated_time_secs(&self) -> u64 {
        self.hops
            .iter()
            .map(|h| h.estimated_execution_time_secs)
            .sum()
    }
}
