//! Route Ranking and Derived Metrics
//!
//! Pure functions from resolved routes to an ordered list. Given identical
//! inputs the output is identical: ordering never depends on provider
//! arrival order, map iteration order, or wall-clock time.
//!
//! Effective received value = final buy amount after fees converted to the
//! reference currency, minus every hop's network fee converted the same way.
//! Ties break by ascending total estimated execution time, then by the fixed
//! swapper enumeration order.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::asset::AssetId;
use super::route::{SwapperName, TradeRoute};

/// Reference-currency price per base unit, per asset. A pure input supplied
/// by the host at ranking time; the engine has no market-data source of its
/// own. Assets missing from the book contribute zero value.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    prices: HashMap<AssetId, Decimal>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register a price
    pub fn with_price(mut self, asset: AssetId, price_per_base_unit: Decimal) -> Self {
        self.prices.insert(asset, price_per_base_unit);
        self
    }

    pub fn price_of(&self, asset: &AssetId) -> Option<Decimal> {
        self.prices.get(asset).copied()
    }

    fn value_of(&self, asset: &AssetId, base_units: u128) -> Decimal {
        match self.price_of(asset) {
            Some(price) => to_decimal(base_units) * price,
            None => Decimal::ZERO,
        }
    }
}

/// Financial projections for one route, in the reference currency
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetrics {
    /// Final buy amount after fees, converted
    pub gross_value: Decimal,
    /// Sum of per-hop network fees, converted
    pub total_network_fee_value: Decimal,
    /// gross_value - total_network_fee_value; the ranking key
    pub effective_value: Decimal,
    pub total_execution_time_secs: u64,
    /// False when any hop's network fee could not be estimated
    pub fees_fully_known: bool,
}

/// One entry of the ranked list
#[derive(Debug, Clone)]
pub struct RankedRoute {
    pub source: SwapperName,
    pub route: TradeRoute,
    pub metrics: RouteMetrics,
}

/// Compute the derived metrics for a single route
pub fn compute_metrics(route: &TradeRoute, book: &PriceBook) -> RouteMetrics {
    let gross_value = book.value_of(route.buy_asset(), route.buy_amount_after_fees());

    let mut total_network_fee_value = Decimal::ZERO;
    let mut fees_fully_known = true;
    for hop in &route.hops {
        match &hop.fee_data.network_fee {
            Some(fee) => {
                total_network_fee_value += book.value_of(&fee.asset, fee.amount);
            }
            None => fees_fully_known = false,
        }
    }

    RouteMetrics {
        gross_value,
        total_network_fee_value,
        effective_value: gross_value - total_network_fee_value,
        total_execution_time_secs: route.total_estimated_time_secs(),
        fees_fully_known,
    }
}

/// Rank resolved routes into a single ordered list, best first.
///
/// Callers pass only usable routes; errored and empty provider responses are
/// excluded upstream but remain recorded for display.
pub fn rank_routes(
    routes: impl IntoIterator<Item = (SwapperName, TradeRoute)>,
    book: &PriceBook,
) -> Vec<RankedRoute> {
    let mut ranked: Vec<RankedRoute> = routes
        .into_iter()
        .map(|(source, route)| {
            let metrics = compute_metrics(&route, book);
            RankedRoute {
                source,
                route,
                metrics,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.metrics
            .effective_value
            .cmp(&a.metrics.effective_value)
            .then(
                a.metrics
                    .total_execution_time_secs
                    .cmp(&b.metrics.total_execution_time_secs),
            )
            .then(a.source.cmp(&b.source))
            .then(a.route.id.cmp(&b.route.id))
    });

    ranked
}

// Base-unit amounts can exceed Decimal's 96-bit mantissa; saturate rather
// than fail, ranking only needs relative order.
fn to_decimal(base_units: u128) -> Decimal {
    Decimal::from_str(&base_units.to_string()).unwrap_or(Decimal::MAX)
}
