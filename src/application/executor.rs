//! Hop Execution
//!
//! Per-hop state machine: build the chain-specific transaction, request a
//! signature, submit, poll for confirmation. Each invocation gets its own
//! event channel carrying the hop index and all context as payload; nothing
//! is captured in ambient closures. A cancellation handle, once invoked,
//! suppresses every further event for that hop and freezes its state where
//! it was.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, RwLock};

use crate::adapters::chains::{adapter_for, resolve_family, ExecutionError};
use crate::config::EngineSection;
use crate::domain::{ChainFamily, QuoteRequest, TradeRoute};
use crate::ports::quote_provider::{QuoteProvider, TradeStatusKind};
use crate::ports::wallet::{WalletError, WalletPort};

/// Hop lifecycle. Transitions only move rightward; `Succeeded` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HopState {
    Idle,
    AwaitingSignature,
    Broadcasting,
    Confirming,
    Succeeded,
    Failed,
}

impl HopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HopState::Succeeded | HopState::Failed)
    }

    /// Forward-only transition check
    pub fn can_advance_to(&self, next: HopState) -> bool {
        !self.is_terminal() && next > *self
    }
}

impl fmt::Display for HopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HopState::Idle => "idle",
            HopState::AwaitingSignature => "awaiting signature",
            HopState::Broadcasting => "broadcasting",
            HopState::Confirming => "confirming",
            HopState::Succeeded => "succeeded",
            HopState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Typed event stream of one `execute_hop` invocation, in emission order:
/// `SellTransactionSubmitted`, zero or more `StatusUpdate`s, then exactly
/// one terminal event (unless cancelled first).
#[derive(Debug, Clone, PartialEq)]
pub enum HopEvent {
    SellTransactionSubmitted {
        tx_id: String,
    },
    StatusUpdate {
        message: String,
        buy_tx_id: Option<String>,
    },
    Succeeded,
    Failed {
        message: String,
    },
    /// Transport/unexpected fault; callers treat it like `Failed`, the
    /// distinction exists for diagnostics
    Error {
        cause: String,
    },
}

impl HopEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HopEvent::Succeeded | HopEvent::Failed { .. } | HopEvent::Error { .. }
        )
    }
}

/// Execution record for one hop of the confirmed route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopExecState {
    pub state: HopState,
    pub sell_tx_id: Option<String>,
    pub buy_tx_id: Option<String>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HopExecState {
    pub fn idle() -> Self {
        Self {
            state: HopState::Idle,
            sell_tx_id: None,
            buy_tx_id: None,
            message: None,
            updated_at: Utc::now(),
        }
    }
}

/// Handle that cancels an in-flight hop execution. Cloneable; cancelling is
/// idempotent.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

fn cancel_pair() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, rx)
}

/// Confirmation polling knobs
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 60,
        }
    }
}

impl ExecutionSettings {
    pub fn from_config(engine: &EngineSection) -> Self {
        Self {
            poll_interval: Duration::from_millis(engine.poll_interval_ms),
            max_poll_attempts: engine.max_poll_attempts,
        }
    }
}

/// A running hop execution: its event stream plus the cancellation handle
#[derive(Debug)]
pub struct HopExecution {
    pub events: mpsc::UnboundedReceiver<HopEvent>,
    pub cancel: CancelHandle,
}

/// Everything one hop execution needs, passed by value: no shared mutable
/// capture between invocations.
pub(crate) struct HopContext {
    pub route: TradeRoute,
    pub request: QuoteRequest,
    pub hop_index: usize,
    pub wallet: Arc<dyn WalletPort>,
    pub provider: Arc<dyn QuoteProvider>,
    pub states: Arc<RwLock<Vec<HopExecState>>>,
    pub settings: ExecutionSettings,
}

pub(crate) fn spawn_hop(ctx: HopContext) -> HopExecution {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel, cancel_rx) = cancel_pair();

    // the task keeps a handle clone alive so the cancel channel never
    // closes underneath the select
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let _keepalive = task_cancel;
        run_hop(ctx, events_tx, cancel_rx).await;
    });

    HopExecution {
        events: events_rx,
        cancel,
    }
}

async fn run_hop(
    ctx: HopContext,
    events: mpsc::UnboundedSender<HopEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    let hop = ctx.route.hops[ctx.hop_index].clone();
    let route_id = ctx.route.id.clone();

    let family = match resolve_family(&hop) {
        Ok(family) => family,
        Err(e) => {
            finish_error(&ctx, &events, e.to_string()).await;
            return;
        }
    };
    let adapter = adapter_for(family);

    tracing::info!(
        route_id = %route_id,
        hop = ctx.hop_index,
        family = %family,
        "starting hop execution"
    );

    set_state(&ctx, HopState::AwaitingSignature, None).await;

    let from = match cancellable(&mut cancel, adapter.signing_address(ctx.wallet.as_ref(), &hop))
        .await
    {
        None => return,
        Some(Ok(address)) => address,
        Some(Err(e)) => {
            finish_error(&ctx, &events, e.to_string()).await;
            return;
        }
    };

    let unsigned = match adapter.build_unsigned(&ctx.route, ctx.hop_index, &hop, &ctx.request, &from)
    {
        Ok(tx) => tx,
        Err(e) => {
            finish_error(&ctx, &events, e.to_string()).await;
            return;
        }
    };

    // signing can block indefinitely on user approval; only cancellation
    // gets us out early
    let signed = match cancellable(&mut cancel, adapter.sign(ctx.wallet.as_ref(), &unsigned)).await
    {
        None => return,
        Some(Ok(payload)) => payload,
        Some(Err(ExecutionError::Wallet(WalletError::Rejected))) => {
            finish_failed(&ctx, &events, "signature rejected by user".to_string()).await;
            return;
        }
        Some(Err(e)) => {
            finish_error(&ctx, &events, e.to_string()).await;
            return;
        }
    };

    // the off-chain variant hands the signed order to the provider and goes
    // straight to confirming; everything else broadcasts
    if family != ChainFamily::OffChainMessage {
        set_state(&ctx, HopState::Broadcasting, None).await;
    }

    let submit = adapter.submit(
        ctx.wallet.as_ref(),
        ctx.provider.as_ref(),
        &ctx.route,
        ctx.hop_index,
        &hop,
        &signed,
    );
    let sell_tx_id = match cancellable(&mut cancel, submit).await {
        None => return,
        Some(Ok(tx_id)) => tx_id,
        Some(Err(e)) => {
            finish_failed(&ctx, &events, e.to_string()).await;
            return;
        }
    };

    tracing::info!(route_id = %route_id, hop = ctx.hop_index, tx_id = %sell_tx_id, "sell transaction submitted");
    {
        let mut states = ctx.states.write().await;
        if let Some(s) = states.get_mut(ctx.hop_index) {
            s.state = HopState::Confirming;
            s.sell_tx_id = Some(sell_tx_id.clone());
            s.updated_at = Utc::now();
        }
    }
    let _ = events.send(HopEvent::SellTransactionSubmitted {
        tx_id: sell_tx_id.clone(),
    });

    for attempt in 0..ctx.settings.max_poll_attempts {
        let status = match cancellable(
            &mut cancel,
            ctx.provider
                .trade_status(&route_id, ctx.hop_index, &sell_tx_id),
        )
        .await
        {
            None => return,
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                // transient poll faults burn an attempt but are not terminal
                tracing::warn!(
                    route_id = %route_id,
                    hop = ctx.hop_index,
                    attempt,
                    error = %e,
                    "trade status poll failed"
                );
                let _ = events.send(HopEvent::StatusUpdate {
                    message: format!("status poll failed: {}", e),
                    buy_tx_id: None,
                });
                if cancellable(&mut cancel, tokio::time::sleep(poll_delay(&ctx.settings)))
                    .await
                    .is_none()
                {
                    return;
                }
                continue;
            }
        };

        let message = status
            .message
            .clone()
            .unwrap_or_else(|| format!("confirming ({})", status_label(status.kind)));
        if let Some(ref buy_tx_id) = status.buy_tx_id {
            let mut states = ctx.states.write().await;
            if let Some(s) = states.get_mut(ctx.hop_index) {
                s.buy_tx_id = Some(buy_tx_id.clone());
                s.updated_at = Utc::now();
            }
        }
        let _ = events.send(HopEvent::StatusUpdate {
            message: message.clone(),
            buy_tx_id: status.buy_tx_id.clone(),
        });

        match status.kind {
            TradeStatusKind::Pending => {
                if cancellable(&mut cancel, tokio::time::sleep(poll_delay(&ctx.settings)))
                    .await
                    .is_none()
                {
                    return;
                }
            }
            TradeStatusKind::Failed => {
                finish_failed(&ctx, &events, message).await;
                return;
            }
            TradeStatusKind::Complete => {
                let buy_tx_id = {
                    let states = ctx.states.read().await;
                    states
                        .get(ctx.hop_index)
                        .and_then(|s| s.buy_tx_id.clone())
                };
                match buy_tx_id {
                    Some(_) => {
                        set_state(&ctx, HopState::Succeeded, None).await;
                        tracing::info!(route_id = %route_id, hop = ctx.hop_index, "hop succeeded");
                        let _ = events.send(HopEvent::Succeeded);
                    }
                    // completion without a destination tx id is a fault the
                    // caller must see, not a silent success
                    None => {
                        finish_error(
                            &ctx,
                            &events,
                            ExecutionError::MissingDestinationTx.to_string(),
                        )
                        .await;
                    }
                }
                return;
            }
        }
    }

    finish_failed(
        &ctx,
        &events,
        ExecutionError::ConfirmationTimeout {
            attempts: ctx.settings.max_poll_attempts,
        }
        .to_string(),
    )
    .await;
}

fn status_label(kind: TradeStatusKind) -> &'static str {
    match kind {
        TradeStatusKind::Pending => "pending",
        TradeStatusKind::Complete => "complete",
        TradeStatusKind::Failed => "failed",
    }
}

// small jitter keeps many sessions from polling providers in lockstep
fn poll_delay(settings: &ExecutionSettings) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..250);
    settings.poll_interval + Duration::from_millis(jitter)
}

async fn set_state(ctx: &HopContext, state: HopState, message: Option<String>) {
    let mut states = ctx.states.write().await;
    if let Some(s) = states.get_mut(ctx.hop_index) {
        if !s.state.can_advance_to(state) {
            tracing::warn!(
                hop = ctx.hop_index,
                from = %s.state,
                to = %state,
                "ignoring backward hop state transition"
            );
            return;
        }
        s.state = state;
        if message.is_some() {
            s.message = message;
        }
        s.updated_at = Utc::now();
    }
}

async fn finish_failed(ctx: &HopContext, events: &mpsc::UnboundedSender<HopEvent>, message: String) {
    tracing::warn!(hop = ctx.hop_index, %message, "hop failed");
    set_state(ctx, HopState::Failed, Some(message.clone())).await;
    let _ = events.send(HopEvent::Failed { message });
}

async fn finish_error(ctx: &HopContext, events: &mpsc::UnboundedSender<HopEvent>, cause: String) {
    tracing::error!(hop = ctx.hop_index, %cause, "hop errored");
    set_state(ctx, HopState::Failed, Some(cause.clone())).await;
    let _ = events.send(HopEvent::Error { cause });
}

/// Run `fut` unless the hop is cancelled first. `None` means cancelled:
/// the caller returns immediately without emitting anything further.
async fn cancellable<T>(
    cancel: &mut watch::Receiver<bool>,
    fut: impl Future<Output = T>,
) -> Option<T> {
    if *cancel.borrow() {
        return None;
    }
    tokio::select! {
        _ = wait_cancelled(cancel) => None,
        out = fut => Some(out),
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // no handle left to cancel with; block this arm forever
            std::future::pending::<()>().await;
        }
    }
}
