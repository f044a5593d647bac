//! Quote Aggregator
//!
//! Fans one quote request out to every enabled provider as an independent
//! tokio task and records each outcome the moment it lands; no provider's
//! latency or failure delays another's result. Each refresh carries a
//! generation tag, and a response arriving for a superseded generation is
//! discarded instead of overwriting newer state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::{
    validate_request, QuoteRequest, RequestContext, RequestValidationError, RouteId, SwapperName,
    TradeRoute,
};
use crate::ports::quote_provider::QuoteError;

/// Derived, top-level aggregation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregatorError {
    /// Every enabled provider has answered and none produced a usable route.
    /// Never raised while any provider is still pending.
    #[error("no quotes available")]
    NoQuotesAvailable,
}

/// One provider's recorded outcome for the current request
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Usable routes keyed by id; empty when the provider errored
    pub routes: HashMap<RouteId, TradeRoute>,
    /// Non-fatal observations about otherwise usable routes
    pub warnings: Vec<String>,
    pub error: Option<QuoteError>,
    pub answered_at: DateTime<Utc>,
}

impl ProviderResponse {
    /// A response never holds both a route and a fatal error; construction
    /// from the contract result maintains that.
    pub fn from_result(result: Result<TradeRoute, QuoteError>) -> Self {
        match result {
            Ok(route) => {
                let mut warnings = Vec::new();
                for (i, hop) in route.hops.iter().enumerate() {
                    if hop.fee_data.network_fee.is_none() {
                        warnings.push(format!("hop {}: network fee could not be estimated", i));
                    }
                }
                let mut routes = HashMap::new();
                routes.insert(route.id.clone(), route);
                Self {
                    routes,
                    warnings,
                    error: None,
                    answered_at: Utc::now(),
                }
            }
            Err(error) => Self {
                routes: HashMap::new(),
                warnings: Vec::new(),
                error: Some(error),
                answered_at: Utc::now(),
            },
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.routes.is_empty()
    }
}

/// Everything recorded for the current quote request. Owned by the session
/// scope: reset whenever the request's defining parameters change.
#[derive(Debug, Default)]
pub struct AggregateState {
    generation: u64,
    request: Option<QuoteRequest>,
    enabled: Vec<SwapperName>,
    responses: HashMap<SwapperName, ProviderResponse>,
}

impl AggregateState {
    fn reset(&mut self, generation: u64, request: QuoteRequest, enabled: Vec<SwapperName>) {
        self.generation = generation;
        self.request = Some(request);
        self.enabled = enabled;
        self.responses.clear();
    }

    fn record(&mut self, name: SwapperName, response: ProviderResponse) {
        self.responses.insert(name, response);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> Option<&QuoteRequest> {
        self.request.as_ref()
    }

    pub fn enabled(&self) -> &[SwapperName] {
        &self.enabled
    }

    pub fn response(&self, name: SwapperName) -> Option<&ProviderResponse> {
        self.responses.get(&name)
    }

    /// A provider that has not answered is distinct from one that answered
    /// with zero routes; only the former is pending.
    pub fn pending(&self) -> Vec<SwapperName> {
        self.enabled
            .iter()
            .copied()
            .filter(|name| !self.responses.contains_key(name))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.enabled.is_empty() && self.pending().is_empty()
    }

    /// True iff every enabled provider answered and none produced a usable
    /// route
    pub fn no_quotes_available(&self) -> bool {
        self.is_complete() && !self.responses.values().any(|r| r.is_usable())
    }

    pub fn get_route(&self, name: SwapperName, route_id: &RouteId) -> Option<&TradeRoute> {
        self.responses.get(&name)?.routes.get(route_id)
    }

    /// All usable routes in deterministic order: swapper enumeration order,
    /// then route id. Errored and empty responses are excluded here but stay
    /// recorded for display.
    pub fn resolved_routes(&self) -> Vec<(SwapperName, TradeRoute)> {
        let mut out = Vec::new();
        for name in SwapperName::ALL {
            if let Some(response) = self.responses.get(&name) {
                let mut ids: Vec<&RouteId> = response.routes.keys().collect();
                ids.sort();
                for id in ids {
                    out.push((name, response.routes[id].clone()));
                }
            }
        }
        out
    }
}

/// Concurrent quote fan-out with stale-response protection
pub struct QuoteAggregator {
    registry: Arc<ProviderRegistry>,
    state: Arc<RwLock<AggregateState>>,
    notify: Arc<watch::Sender<u64>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl QuoteAggregator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            registry,
            state: Arc::new(RwLock::new(AggregateState::default())),
            notify: Arc::new(notify),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared handle to the aggregate state
    pub fn state(&self) -> Arc<RwLock<AggregateState>> {
        Arc::clone(&self.state)
    }

    /// Receiver that ticks on every state mutation; ranking layers
    /// recompute reactively off this.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    /// Validate the request and fan it out to every enabled provider.
    ///
    /// A failed precondition invokes no providers. Outstanding tasks from a
    /// previous refresh are aborted, and any of their responses that still
    /// arrive carry a stale generation and are dropped on the floor.
    pub async fn refresh(
        &self,
        request: QuoteRequest,
        ctx: &RequestContext,
    ) -> Result<(), RequestValidationError> {
        validate_request(&request, ctx)?;

        self.cancel_pending();

        let generation = {
            let mut state = self.state.write().await;
            let generation = state.generation() + 1;
            state.reset(generation, request.clone(), self.registry.names());
            generation
        };
        self.notify.send_modify(|v| *v += 1);

        tracing::info!(
            generation,
            providers = self.registry.len(),
            sell = %request.sell_asset,
            buy = %request.buy_asset,
            "fanning out quote request"
        );

        let mut tasks = self.tasks.lock().unwrap();
        for provider in self.registry.enabled() {
            let provider = Arc::clone(provider);
            let request = request.clone();
            let state = Arc::clone(&self.state);
            let notify = Arc::clone(&self.notify);

            tasks.push(tokio::spawn(async move {
                let name = provider.name();
                let result = provider.quote(&request).await;

                match &result {
                    Ok(route) => tracing::debug!(
                        provider = %name,
                        route_id = %route.id,
                        "quote resolved"
                    ),
                    Err(e) => tracing::debug!(provider = %name, error = %e, "quote failed"),
                }

                let mut state = state.write().await;
                if state.generation() != generation {
                    tracing::debug!(provider = %name, "discarding stale quote response");
                    return;
                }
                state.record(name, ProviderResponse::from_result(result));
                drop(state);
                notify.send_modify(|v| *v += 1);
            }));
        }

        Ok(())
    }

    /// Abort outstanding quote tasks. Safe against executing trades: this
    /// only touches quote fan-out, never execution state.
    pub fn cancel_pending(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Wait until every enabled provider has answered the current request.
    /// Callers bound this with their own timeout.
    pub async fn await_completion(&self) {
        let mut rx = self.subscribe();
        loop {
            if self.state.read().await.is_complete() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for QuoteAggregator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
