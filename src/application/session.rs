//! Swap Session
//!
//! Session-scoped state tying the pieces together: the aggregator's quote
//! state, the user's pinned selection, the confirmed-route lock, and per-hop
//! execution state. This is the only mutation path into any of them; the
//! state tree is explicit and owned here, never ambient.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, RwLock};

use crate::adapters::providers::ProviderRegistry;
use crate::domain::{
    rank_routes, PriceBook, QuoteRequest, RankedRoute, RequestContext, RequestValidationError,
    RouteId, SwapperName, TradeRoute,
};
use crate::ports::wallet::WalletPort;

use super::aggregator::{AggregatorError, QuoteAggregator};
use super::executor::{
    spawn_hop, CancelHandle, ExecutionSettings, HopContext, HopExecState, HopExecution, HopState,
};

/// The route a caller should act on right now
#[derive(Debug, Clone)]
pub struct ActiveRoute {
    pub swapper: SwapperName,
    pub route: TradeRoute,
}

/// Snapshot taken the instant execution is confirmed. Immutable for the
/// lifetime of the trade; aggregator refreshes cannot reach it.
#[derive(Debug, Clone)]
pub struct ConfirmedRoute {
    pub swapper: SwapperName,
    pub route: TradeRoute,
    /// The request the route answered, frozen alongside it
    pub request: QuoteRequest,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("no active route to confirm")]
    NoActiveRoute,

    #[error("a route is already confirmed")]
    AlreadyConfirmed,

    #[error("no confirmed route")]
    NotConfirmed,

    #[error("hop index {index} out of range ({hops} hops)")]
    HopIndexOutOfRange { index: usize, hops: usize },

    #[error("hop {index} has not succeeded yet")]
    PriorHopIncomplete { index: usize },

    #[error("hop {index} was already started")]
    HopAlreadyStarted { index: usize },

    #[error("route not found in current quote state")]
    UnknownRoute,

    #[error("provider {0} is not registered")]
    ProviderUnavailable(SwapperName),
}

/// One user trade session
pub struct SwapSession {
    aggregator: QuoteAggregator,
    registry: Arc<ProviderRegistry>,
    wallet: Arc<dyn WalletPort>,
    price_book: RwLock<PriceBook>,
    pinned: RwLock<Option<(SwapperName, RouteId)>>,
    confirmed: RwLock<Option<ConfirmedRoute>>,
    hop_states: Arc<RwLock<Vec<HopExecState>>>,
    hop_cancels: Mutex<Vec<Option<CancelHandle>>>,
    settings: ExecutionSettings,
}

impl SwapSession {
    pub fn new(registry: Arc<ProviderRegistry>, wallet: Arc<dyn WalletPort>) -> Self {
        Self {
            aggregator: QuoteAggregator::new(Arc::clone(&registry)),
            registry,
            wallet,
            price_book: RwLock::new(PriceBook::new()),
            pinned: RwLock::new(None),
            confirmed: RwLock::new(None),
            hop_states: Arc::new(RwLock::new(Vec::new())),
            hop_cancels: Mutex::new(Vec::new()),
            settings: ExecutionSettings::default(),
        }
    }

    /// Builder method to override polling settings
    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the reference-currency price book used by ranking
    pub async fn set_price_book(&self, book: PriceBook) {
        *self.price_book.write().await = book;
    }

    /// Issue (or re-issue) the quote request. The fan-out runs in the
    /// background; subscribe to watch results land. A changed trade clears
    /// any pinned selection; a confirmed route is never touched from here.
    pub async fn request_quotes(
        &self,
        request: QuoteRequest,
        ctx: &RequestContext,
    ) -> Result<(), RequestValidationError> {
        let prior = {
            let state = self.aggregator.state();
            let state = state.read().await;
            state.request().cloned()
        };

        self.aggregator.refresh(request.clone(), ctx).await?;

        let trade_changed = prior.map_or(true, |p| !p.same_trade(&request));
        if trade_changed {
            *self.pinned.write().await = None;
        }
        Ok(())
    }

    /// Ticks on every aggregate-state mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.aggregator.subscribe()
    }

    /// Wait until every enabled provider has answered
    pub async fn await_quotes(&self) {
        self.aggregator.await_completion().await;
    }

    /// Deterministic ranking over the current aggregate state. Partial
    /// results rank fine; the error appears only once every provider has
    /// answered and none was usable.
    pub async fn current_ranking(&self) -> Result<Vec<RankedRoute>, AggregatorError> {
        let state = self.aggregator.state();
        let state = state.read().await;
        if state.no_quotes_available() {
            return Err(AggregatorError::NoQuotesAvailable);
        }
        let book = self.price_book.read().await;
        Ok(rank_routes(state.resolved_routes(), &book))
    }

    /// Confirmed snapshot, else still-resolving pin, else ranking top, else
    /// nothing
    pub async fn active_route(&self) -> Option<ActiveRoute> {
        if let Some(confirmed) = self.confirmed.read().await.as_ref() {
            return Some(ActiveRoute {
                swapper: confirmed.swapper,
                route: confirmed.route.clone(),
            });
        }
        self.resolve_unconfirmed_active().await
    }

    async fn resolve_unconfirmed_active(&self) -> Option<ActiveRoute> {
        if let Some((swapper, route_id)) = self.pinned.read().await.clone() {
            let state = self.aggregator.state();
            let state = state.read().await;
            if let Some(route) = state.get_route(swapper, &route_id) {
                return Some(ActiveRoute {
                    swapper,
                    route: route.clone(),
                });
            }
        }

        self.current_ranking()
            .await
            .ok()?
            .into_iter()
            .next()
            .map(|ranked| ActiveRoute {
                swapper: ranked.source,
                route: ranked.route,
            })
    }

    /// Pin an explicit route choice. It must resolve in the current state.
    pub async fn pin_route(
        &self,
        swapper: SwapperName,
        route_id: RouteId,
    ) -> Result<(), SessionError> {
        let state = self.aggregator.state();
        let state = state.read().await;
        if state.get_route(swapper, &route_id).is_none() {
            return Err(SessionError::UnknownRoute);
        }
        drop(state);
        *self.pinned.write().await = Some((swapper, route_id));
        Ok(())
    }

    pub async fn clear_pin(&self) {
        *self.pinned.write().await = None;
    }

    /// Freeze the active route for execution. The sole transition into
    /// execution-eligible state.
    pub async fn confirm_route(&self) -> Result<ConfirmedRoute, SessionError> {
        let mut confirmed = self.confirmed.write().await;
        if confirmed.is_some() {
            return Err(SessionError::AlreadyConfirmed);
        }

        let active = self
            .resolve_unconfirmed_active()
            .await
            .ok_or(SessionError::NoActiveRoute)?;
        let request = {
            let state = self.aggregator.state();
            let state = state.read().await;
            state.request().cloned()
        }
        .ok_or(SessionError::NoActiveRoute)?;

        let snapshot = ConfirmedRoute {
            swapper: active.swapper,
            route: active.route,
            request,
            confirmed_at: Utc::now(),
        };

        let hops = snapshot.route.hops.len();
        *self.hop_states.write().await = vec![HopExecState::idle(); hops];
        *self.hop_cancels.lock().unwrap() = (0..hops).map(|_| None).collect();

        tracing::info!(
            swapper = %snapshot.swapper,
            route_id = %snapshot.route.id,
            hops,
            "route confirmed for execution"
        );

        *confirmed = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Release the lock. Called on trade completion, trade failure, or
    /// explicit user cancellation; background refreshes have no path here.
    pub async fn release_confirmed_route(&self) {
        self.cancel_hops();
        *self.confirmed.write().await = None;
        self.hop_states.write().await.clear();
        tracing::info!("confirmed route released");
    }

    pub async fn confirmed_route(&self) -> Option<ConfirmedRoute> {
        self.confirmed.read().await.clone()
    }

    /// Start executing hop `index` of the confirmed route. Hops run
    /// strictly in order: every earlier hop must already have succeeded.
    pub async fn execute_hop(&self, index: usize) -> Result<HopExecution, SessionError> {
        let confirmed = self
            .confirmed
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotConfirmed)?;

        let hops = confirmed.route.hops.len();
        if index >= hops {
            return Err(SessionError::HopIndexOutOfRange { index, hops });
        }

        {
            let states = self.hop_states.read().await;
            for (i, s) in states.iter().enumerate().take(index) {
                if s.state != HopState::Succeeded {
                    return Err(SessionError::PriorHopIncomplete { index: i });
                }
            }
            if states[index].state != HopState::Idle {
                return Err(SessionError::HopAlreadyStarted { index });
            }
        }

        let provider = self
            .registry
            .get(confirmed.swapper)
            .ok_or(SessionError::ProviderUnavailable(confirmed.swapper))?;

        let execution = spawn_hop(HopContext {
            route: confirmed.route.clone(),
            request: confirmed.request.clone(),
            hop_index: index,
            wallet: Arc::clone(&self.wallet),
            provider,
            states: Arc::clone(&self.hop_states),
            settings: self.settings.clone(),
        });

        self.hop_cancels.lock().unwrap()[index] = Some(execution.cancel.clone());
        Ok(execution)
    }

    /// Tear the session down: stop outstanding quote fetches, cancel any
    /// in-flight hop, release the confirmed route.
    pub async fn abandon(&self) {
        self.aggregator.cancel_pending();
        self.release_confirmed_route().await;
    }

    fn cancel_hops(&self) {
        let mut cancels = self.hop_cancels.lock().unwrap();
        for cancel in cancels.iter_mut() {
            if let Some(handle) = cancel.take() {
                handle.cancel();
            }
        }
    }

    /// Errors recorded per provider for the current request, in enumeration
    /// order. Display-only: these never leave the aggregate state.
    pub async fn provider_errors(&self) -> Vec<(SwapperName, crate::ports::QuoteError)> {
        let state = self.aggregator.state();
        let state = state.read().await;
        let mut out = Vec::new();
        for name in SwapperName::ALL {
            if let Some(response) = state.response(name) {
                if let Some(error) = &response.error {
                    out.push((name, error.clone()));
                }
            }
        }
        out
    }

    /// Non-fatal warnings recorded per provider for the current request
    pub async fn provider_warnings(&self) -> Vec<(SwapperName, Vec<String>)> {
        let state = self.aggregator.state();
        let state = state.read().await;
        let mut out = Vec::new();
        for name in SwapperName::ALL {
            if let Some(response) = state.response(name) {
                if !response.warnings.is_empty() {
                    out.push((name, response.warnings.clone()));
                }
            }
        }
        out
    }

    pub async fn hop_states(&self) -> Vec<HopExecState> {
        self.hop_states.read().await.clone()
    }

    pub async fn hop_state(&self, index: usize) -> Option<HopExecState> {
        self.hop_states.read().await.get(index).cloned()
    }
}

// tearing the session down must not leave pollers running; quote tasks are
// aborted by the aggregator's own Drop
impl Drop for SwapSession {
    fn drop(&mut self) {
        self.cancel_hops();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, ChainId, Hop, WalletCapabilities};
    use crate::ports::mocks::{MockSwapper, MockWallet};
    use crate::ports::quote_provider::QuoteError;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn request() -> QuoteRequest {
        QuoteRequest {
            sell_asset: AssetId::new("eip155:1", "slip44:60"),
            buy_asset: AssetId::new("eip155:10", "slip44:60"),
            sell_amount: 1_000,
            account_number: 0,
            receive_address: "0xrecv".to_string(),
            send_address: "0xsend".to_string(),
            capabilities: WalletCapabilities::default(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::permissive([ChainId::from("eip155:1"), ChainId::from("eip155:10")])
    }

    fn route(id: &str, source: SwapperName, buy_after_fees: u128) -> TradeRoute {
        let mut hop = Hop::fixed_rate_bridge(
            AssetId::new("eip155:1", "slip44:60"),
            AssetId::new("eip155:10", "slip44:60"),
            0,
            1_000,
            source,
        );
        hop.buy_amount_before_fees = buy_after_fees;
        hop.buy_amount_after_fees = buy_after_fees;
        TradeRoute::try_new(
            RouteId::new(id),
            vec![hop],
            dec!(1),
            0,
            dec!(0.005),
            "0xrecv".to_string(),
        )
        .unwrap()
    }

    fn book() -> PriceBook {
        PriceBook::new().with_price(AssetId::new("eip155:10", "slip44:60"), dec!(0.001))
    }

    async fn session_with(providers: Vec<MockSwapper>) -> SwapSession {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry = registry.with_provider(Arc::new(p));
        }
        let session = SwapSession::new(Arc::new(registry), Arc::new(MockWallet::new()));
        session.set_price_book(book()).await;
        session
    }

    #[tokio::test]
    async fn test_active_route_tracks_ranking_top() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::ZeroEx).with_route(route("z", SwapperName::ZeroEx, 900)),
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;

        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        let ranking = session.current_ranking().await.unwrap();
        let active = session.active_route().await.unwrap();
        assert_eq!(active.swapper, ranking[0].source);
        assert_eq!(active.swapper, SwapperName::LiFi);
    }

    #[tokio::test]
    async fn test_pin_overrides_ranking() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::ZeroEx).with_route(route("z", SwapperName::ZeroEx, 900)),
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;

        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        session
            .pin_route(SwapperName::ZeroEx, RouteId::new("z"))
            .await
            .unwrap();
        let active = session.active_route().await.unwrap();
        assert_eq!(active.swapper, SwapperName::ZeroEx);

        session.clear_pin().await;
        let active = session.active_route().await.unwrap();
        assert_eq!(active.swapper, SwapperName::LiFi);
    }

    #[tokio::test]
    async fn test_pin_unknown_route_rejected() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::ZeroEx).with_route(route("z", SwapperName::ZeroEx, 900)),
        ])
        .await;
        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        let err = session
            .pin_route(SwapperName::LiFi, RouteId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::UnknownRoute);
    }

    #[tokio::test]
    async fn test_confirm_requires_active_route() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::ZeroEx)
                .with_error(QuoteError::UnsupportedTradePair("no".into())),
        ])
        .await;
        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        let err = session.confirm_route().await.unwrap_err();
        assert_eq!(err, SessionError::NoActiveRoute);
    }

    #[tokio::test]
    async fn test_confirmed_route_is_locked() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;
        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        let confirmed = session.confirm_route().await.unwrap();
        assert_eq!(confirmed.route.id, RouteId::new("l"));

        // double confirm is rejected
        assert_eq!(
            session.confirm_route().await.unwrap_err(),
            SessionError::AlreadyConfirmed
        );

        // a newer, better quote does not displace the snapshot
        let mut req2 = request();
        req2.sell_amount = 2_000;
        session.request_quotes(req2, &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        let active = session.active_route().await.unwrap();
        assert_eq!(active.route.id, RouteId::new("l"));
        assert_eq!(active.route, confirmed.route);

        session.release_confirmed_route().await;
        assert!(session.confirmed_route().await.is_none());
    }

    #[tokio::test]
    async fn test_execute_hop_requires_confirmation() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;
        let err = session.execute_hop(0).await.unwrap_err();
        assert_eq!(err, SessionError::NotConfirmed);
    }

    #[tokio::test]
    async fn test_execute_hop_index_bounds() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;
        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();
        session.confirm_route().await.unwrap();

        let err = session.execute_hop(5).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::HopIndexOutOfRange { index: 5, hops: 1 }
        );
    }

    #[tokio::test]
    async fn test_trade_change_clears_pin() {
        let session = session_with(vec![
            MockSwapper::new(SwapperName::ZeroEx).with_route(route("z", SwapperName::ZeroEx, 900)),
            MockSwapper::new(SwapperName::LiFi).with_route(route("l", SwapperName::LiFi, 950)),
        ])
        .await;
        session.request_quotes(request(), &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();
        session
            .pin_route(SwapperName::ZeroEx, RouteId::new("z"))
            .await
            .unwrap();

        let mut req2 = request();
        req2.sell_amount = 9_999;
        session.request_quotes(req2, &ctx()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
            .await
            .unwrap();

        // pin gone, ranking top wins again
        let active = session.active_route().await.unwrap();
        assert_eq!(active.swapper, SwapperName::LiFi);
    }
}
