//! Hand-Rolled Port Mocks
//!
//! Call-recording, scripted-response implementations of the port traits.
//! Used by unit and integration tests, and by the CLI's paper execution
//! mode, which signs with [`MockWallet`] instead of a real device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::domain::{ChainId, QuoteRequest, RouteId, SwapperName, TradeRoute};
use crate::ports::quote_provider::{QuoteError, QuoteProvider, TradeStatus};
use crate::ports::wallet::{SignedPayload, UnsignedTx, WalletError, WalletPort};

/// Scripted quote provider that records calls and replays configured
/// responses
pub struct MockSwapper {
    name: SwapperName,
    route: Option<TradeRoute>,
    error: Option<QuoteError>,
    quote_delay: Option<Duration>,
    statuses: Mutex<VecDeque<TradeStatus>>,
    reject_orders: bool,
    quote_calls: Mutex<Vec<QuoteRequest>>,
    status_calls: Mutex<Vec<(RouteId, usize, String)>>,
    submitted_orders: Mutex<Vec<String>>,
    order_counter: AtomicU64,
}

impl MockSwapper {
    pub fn new(name: SwapperName) -> Self {
        Self {
            name,
            route: None,
            error: None,
            quote_delay: None,
            statuses: Mutex::new(VecDeque::new()),
            reject_orders: false,
            quote_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            submitted_orders: Mutex::new(Vec::new()),
            order_counter: AtomicU64::new(0),
        }
    }

    /// Builder method: answer every quote with this route
    pub fn with_route(mut self, route: TradeRoute) -> Self {
        self.route = Some(route);
        self.error = None;
        self
    }

    /// Builder method: answer every quote with this error
    pub fn with_error(mut self, error: QuoteError) -> Self {
        self.error = Some(error);
        self.route = None;
        self
    }

    /// Builder method: delay quote responses (latency simulation)
    pub fn with_quote_delay(mut self, delay: Duration) -> Self {
        self.quote_delay = Some(delay);
        self
    }

    /// Builder method: replay these statuses in order, one per poll. Once
    /// exhausted, polls report completion with a deterministic buy tx id.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = TradeStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().collect();
        self
    }

    /// Builder method: reject off-chain order submission
    pub fn with_order_rejection(mut self) -> Self {
        self.reject_orders = true;
        self
    }

    pub fn quote_calls(&self) -> Vec<QuoteRequest> {
        self.quote_calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<(RouteId, usize, String)> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn submitted_orders(&self) -> Vec<String> {
        self.submitted_orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteProvider for MockSwapper {
    fn name(&self) -> SwapperName {
        self.name
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<TradeRoute, QuoteError> {
        self.quote_calls.lock().unwrap().push(request.clone());

        if let Some(delay) = self.quote_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref error) = self.error {
            return Err(error.clone());
        }
        self.route.clone().ok_or_else(|| {
            QuoteError::UnsupportedTradePair(format!("{} has no scripted route", self.name))
        })
    }

    async fn trade_status(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        sell_tx_id: &str,
    ) -> Result<TradeStatus, QuoteError> {
        self.status_calls
            .lock()
            .unwrap()
            .push((route_id.clone(), hop_index, sell_tx_id.to_string()));

        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| TradeStatus::complete(format!("{}-buy-tx", route_id))))
    }

    async fn submit_signed_order(
        &self,
        _route_id: &RouteId,
        _hop_index: usize,
        signed_payload: &str,
    ) -> Result<String, QuoteError> {
        if self.reject_orders {
            return Err(QuoteError::ValidationFailed(
                "order rejected by provider".to_string(),
            ));
        }
        self.submitted_orders
            .lock()
            .unwrap()
            .push(signed_payload.to_string());
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("order-{}", n))
    }
}

/// Scripted wallet that signs deterministically and mints sequential tx ids
pub struct MockWallet {
    reject_signing: bool,
    /// Broadcasts starting at this attempt index fail with the message
    fail_broadcast: Option<(u64, String)>,
    sign_delay: Option<Duration>,
    broadcast_attempts: AtomicU64,
    signed: Mutex<Vec<UnsignedTx>>,
    broadcasts: Mutex<Vec<(ChainId, SignedPayload)>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            reject_signing: false,
            fail_broadcast: None,
            sign_delay: None,
            broadcast_attempts: AtomicU64::new(0),
            signed: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Builder method: refuse every signature request
    pub fn with_signing_rejected(mut self) -> Self {
        self.reject_signing = true;
        self
    }

    /// Builder method: fail every broadcast with this message
    pub fn with_broadcast_failure(mut self, message: impl Into<String>) -> Self {
        self.fail_broadcast = Some((0, message.into()));
        self
    }

    /// Builder method: first `after` broadcasts succeed, the rest fail
    pub fn with_broadcast_failure_after(mut self, after: u64, message: impl Into<String>) -> Self {
        self.fail_broadcast = Some((after, message.into()));
        self
    }

    /// Builder method: delay signing (user-approval simulation)
    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    pub fn signed_transactions(&self) -> Vec<UnsignedTx> {
        self.signed.lock().unwrap().clone()
    }

    pub fn broadcast_calls(&self) -> Vec<(ChainId, SignedPayload)> {
        self.broadcasts.lock().unwrap().clone()
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletPort for MockWallet {
    async fn derive_address(
        &self,
        chain: &ChainId,
        account_number: u32,
    ) -> Result<String, WalletError> {
        Ok(format!("{}-addr-{}", chain.namespace(), account_number))
    }

    async fn sign_transaction(&self, tx: &UnsignedTx) -> Result<SignedPayload, WalletError> {
        if let Some(delay) = self.sign_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_signing {
            return Err(WalletError::Rejected);
        }

        self.signed.lock().unwrap().push(tx.clone());
        let body = serde_json::to_vec(tx).map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(SignedPayload {
            family: tx.family(),
            data: BASE64.encode(body),
        })
    }

    async fn sign_message(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError> {
        if self.reject_signing {
            return Err(WalletError::Rejected);
        }
        let mut sig = b"signed:".to_vec();
        sig.extend_from_slice(payload);
        Ok(sig)
    }

    async fn broadcast(
        &self,
        chain: &ChainId,
        payload: &SignedPayload,
    ) -> Result<String, WalletError> {
        let attempt = self.broadcast_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some((after, ref message)) = self.fail_broadcast {
            if attempt >= after {
                return Err(WalletError::Broadcast(message.clone()));
            }
        }
        self.broadcasts
            .lock()
            .unwrap()
            .push((chain.clone(), payload.clone()));
        Ok(format!("txid-{}", attempt))
    }
}
