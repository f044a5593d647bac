//! Quote Provider Port
//!
//! The contract every swapper implements. Quoting is read-only: a provider
//! may hit its own price and liquidity sources but never submits
//! transactions. The two execution-support operations (`trade_status`,
//! `submit_signed_order`) exist for the hop executor; providers that settle
//! on-chain reject order submission.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{QuoteRequest, RouteId, SwapperName, TradeRoute};

/// Structured per-provider quote failure. Non-fatal: recorded alongside the
/// other providers' results, never raised past the aggregator.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum QuoteError {
    #[error("trade pair not supported: {0}")]
    UnsupportedTradePair(String),

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("network fee estimation failed: {0}")]
    NetworkFeeEstimationFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Transport/timeout faults, wrapped so no raw error type crosses the
    /// contract boundary
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Lifecycle of an in-flight hop as reported by the settling provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TradeStatusKind {
    Pending,
    Complete,
    Failed,
}

/// One confirmation-poll observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatus {
    pub kind: TradeStatusKind,
    /// Destination-side transaction id, once observed
    pub buy_tx_id: Option<String>,
    pub message: Option<String>,
}

impl TradeStatus {
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            kind: TradeStatusKind::Pending,
            buy_tx_id: None,
            message: Some(message.into()),
        }
    }

    pub fn complete(buy_tx_id: impl Into<String>) -> Self {
        Self {
            kind: TradeStatusKind::Complete,
            buy_tx_id: Some(buy_tx_id.into()),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: TradeStatusKind::Failed,
            buy_tx_id: None,
            message: Some(message.into()),
        }
    }
}

/// The swapper contract.
///
/// `quote` must not mutate shared state and must resolve within the
/// adapter's configured timeout, reporting a structured [`QuoteError`]
/// rather than a raw transport error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> SwapperName;

    async fn quote(&self, request: &QuoteRequest) -> Result<TradeRoute, QuoteError>;

    /// Poll settlement progress for a hop previously submitted on-chain (or
    /// as a signed order) under `sell_tx_id`
    async fn trade_status(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        sell_tx_id: &str,
    ) -> Result<TradeStatus, QuoteError>;

    /// Submit an off-chain signed order for settlement. Only meaningful for
    /// providers whose hops skip broadcast; everyone else rejects it.
    async fn submit_signed_order(
        &self,
        _route_id: &RouteId,
        _hop_index: usize,
        _signed_payload: &str,
    ) -> Result<String, QuoteError> {
        Err(QuoteError::ValidationFailed(
            "provider does not settle off-chain orders".to_string(),
        ))
    }
}
