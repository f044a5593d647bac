//! Domain Layer - Pure types and logic
//!
//! Assets and chains, trade routes and hops, quote requests with their
//! request-level validation, and the deterministic ranking functions.
//! Nothing in this module performs I/O.

pub mod asset;
pub mod ranking;
pub mod request;
pub mod route;

pub use asset::{AssetId, ChainFamily, ChainId, UnsupportedChain};
pub use ranking::{compute_metrics, rank_routes, PriceBook, RankedRoute, RouteMetrics};
pub use request::{
    validate_request, QuoteRequest, RequestContext, RequestValidationError, WalletCapabilities,
};
pub use route::{
    BridgeDirection, FeeData, Hop, NetworkFee, ProtocolFee, RouteError, RouteId, SwapperName,
    TradeRoute,
};
