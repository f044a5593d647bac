//! Engine Integration Tests
//!
//! End-to-end flows over the session boundary with scripted providers and a
//! scripted wallet:
//! 1. quote fan-out -> ranking -> active route -> confirm -> execute
//! 2. strict hop ordering and failure isolation
//! 3. cancellation semantics of confirmation polling
//!
//! All tests are deterministic (no real network calls) and use mock data.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_test::assert_ok;

use portage::adapters::providers::ProviderRegistry;
use portage::application::{ExecutionSettings, HopEvent, HopState, SessionError, SwapSession};
use portage::domain::{
    AssetId, ChainId, FeeData, Hop, PriceBook, QuoteRequest, RequestContext, RouteId, SwapperName,
    TradeRoute, WalletCapabilities,
};
use portage::ports::mocks::{MockSwapper, MockWallet};
use portage::ports::{QuoteError, TradeStatus, TradeStatusKind};

// ============================================================================
// Test Fixtures
// ============================================================================

fn btc() -> AssetId {
    AssetId::new("bip122:000000000019d6689c085ae165831e93", "slip44:0")
}

fn eth() -> AssetId {
    AssetId::new("eip155:1", "slip44:60")
}

fn usdc() -> AssetId {
    AssetId::new("eip155:1", "erc20:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
}

fn all_chains() -> RequestContext {
    RequestContext::permissive([
        ChainId::from("bip122:000000000019d6689c085ae165831e93"),
        ChainId::from("eip155:1"),
        ChainId::from("eip155:10"),
    ])
}

fn fast_settings() -> ExecutionSettings {
    ExecutionSettings {
        poll_interval: Duration::from_millis(10),
        max_poll_attempts: 20,
    }
}

fn request(sell: AssetId, buy: AssetId, amount: u128) -> QuoteRequest {
    QuoteRequest {
        sell_asset: sell,
        buy_asset: buy,
        sell_amount: amount,
        account_number: 0,
        receive_address: "0xrecv".to_string(),
        send_address: "0xsend".to_string(),
        capabilities: WalletCapabilities {
            supports_fee_bump: true,
        },
    }
}

fn evm_hop(sell: AssetId, buy: AssetId, buy_amount: u128, source: SwapperName) -> Hop {
    Hop {
        sell_asset: sell.clone(),
        buy_asset: buy,
        account_number: 0,
        sell_amount_incl_fees: 1_000_000,
        buy_amount_before_fees: buy_amount,
        buy_amount_after_fees: buy_amount,
        fee_data: FeeData::network_only(sell, 1_000),
        estimated_execution_time_secs: 30,
        source,
        allowance_contract: Some("0xrouter".to_string()),
        deposit_address: None,
        memo: None,
        bridge: None,
    }
}

fn single_hop_route(id: &str, source: SwapperName, buy_amount: u128) -> TradeRoute {
    TradeRoute::try_new(
        RouteId::new(id),
        vec![evm_hop(eth(), usdc(), buy_amount, source)],
        dec!(2000),
        30,
        dec!(0.005),
        "0xrecv".to_string(),
    )
    .unwrap()
}

fn two_hop_route(id: &str, source: SwapperName) -> TradeRoute {
    let first = Hop {
        sell_asset: btc(),
        buy_asset: eth(),
        account_number: 0,
        sell_amount_incl_fees: 100_000,
        buy_amount_before_fees: 1_500_000,
        buy_amount_after_fees: 1_480_000,
        fee_data: FeeData::network_only(btc(), 450),
        estimated_execution_time_secs: 600,
        source,
        allowance_contract: None,
        deposit_address: Some("bc1qvault".to_string()),
        memo: Some("=:ETH.ETH:0xrecv".to_string()),
        bridge: None,
    };
    let second = evm_hop(eth(), usdc(), 2_000_000, source);

    TradeRoute::try_new(
        RouteId::new(id),
        vec![first, second],
        dec!(15),
        30,
        dec!(0.005),
        "0xrecv".to_string(),
    )
    .unwrap()
}

struct Harness {
    session: SwapSession,
    wallet: Arc<MockWallet>,
    swappers: Vec<Arc<MockSwapper>>,
}

fn harness(swappers: Vec<MockSwapper>, wallet: MockWallet) -> Harness {
    let wallet = Arc::new(wallet);
    let swappers: Vec<Arc<MockSwapper>> = swappers.into_iter().map(Arc::new).collect();

    let mut registry = ProviderRegistry::new();
    for swapper in &swappers {
        registry = registry.with_provider(swapper.clone());
    }

    let session = SwapSession::new(Arc::new(registry), wallet.clone())
        .with_settings(fast_settings());

    Harness {
        session,
        wallet,
        swappers,
    }
}

async fn quotes_ready(session: &SwapSession, request: QuoteRequest) {
    session
        .request_quotes(request, &all_chains())
        .await
        .expect("request should validate");
    tokio::time::timeout(Duration::from_secs(5), session.await_quotes())
        .await
        .expect("providers should answer");
}

async fn drain_events(
    execution: &mut portage::application::HopExecution,
) -> Vec<HopEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = execution.events.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
    })
    .await;
    deadline.expect("hop should reach a terminal event");
    events
}

// ============================================================================
// Quote aggregation and ranking
// ============================================================================

#[tokio::test]
async fn full_quote_flow_picks_best_route() {
    let h = harness(
        vec![
            MockSwapper::new(SwapperName::ZeroEx)
                .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 1_990_000)),
            MockSwapper::new(SwapperName::LiFi)
                .with_route(single_hop_route("lifi-1", SwapperName::LiFi, 2_000_000)),
            MockSwapper::new(SwapperName::Thorchain)
                .with_error(QuoteError::UnsupportedTradePair("no pool".into())),
        ],
        MockWallet::new(),
    );
    h.session
        .set_price_book(PriceBook::new().with_price(usdc(), dec!(0.000001)))
        .await;

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;

    let ranking = assert_ok!(h.session.current_ranking().await);
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].source, SwapperName::LiFi);

    let active = h.session.active_route().await.unwrap();
    assert_eq!(active.route.id, RouteId::new("lifi-1"));

    // the errored provider stayed recorded for display
    let errors = h.session.provider_errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, SwapperName::Thorchain);
}

#[tokio::test]
async fn no_quotes_available_when_every_provider_fails() {
    let h = harness(
        vec![
            MockSwapper::new(SwapperName::ZeroEx)
                .with_error(QuoteError::InsufficientLiquidity("dry".into())),
            MockSwapper::new(SwapperName::LiFi)
                .with_error(QuoteError::ValidationFailed("bad".into())),
        ],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;

    assert!(h.session.current_ranking().await.is_err());
    assert!(h.session.active_route().await.is_none());
    assert_eq!(
        h.session.confirm_route().await.unwrap_err(),
        SessionError::NoActiveRoute
    );
}

// ============================================================================
// Execution: success paths
// ============================================================================

#[tokio::test]
async fn single_hop_executes_in_event_order() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::ZeroEx)
            .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))
            .with_statuses([
                TradeStatus::pending("indexing"),
                TradeStatus::complete("0xbuytx"),
            ])],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut execution = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut execution).await;

    assert!(matches!(
        events.first(),
        Some(HopEvent::SellTransactionSubmitted { tx_id }) if tx_id == "txid-0"
    ));
    assert!(matches!(events.last(), Some(HopEvent::Succeeded)));
    let status_updates = events
        .iter()
        .filter(|e| matches!(e, HopEvent::StatusUpdate { .. }))
        .count();
    assert!(status_updates >= 2);

    let hop = h.session.hop_state(0).await.unwrap();
    assert_eq!(hop.state, HopState::Succeeded);
    assert_eq!(hop.sell_tx_id.as_deref(), Some("txid-0"));
    assert_eq!(hop.buy_tx_id.as_deref(), Some("0xbuytx"));

    // the sell transaction was actually signed and broadcast
    assert_eq!(h.wallet.signed_transactions().len(), 1);
    assert_eq!(h.wallet.broadcast_calls().len(), 1);
}

#[tokio::test]
async fn two_hop_route_executes_sequentially() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::Thorchain)
            .with_route(two_hop_route("tc-1", SwapperName::Thorchain))],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(btc(), usdc(), 100_000)).await;
    h.session.confirm_route().await.unwrap();

    // hop 1 cannot start before hop 0 succeeds
    assert_eq!(
        h.session.execute_hop(1).await.unwrap_err(),
        SessionError::PriorHopIncomplete { index: 0 }
    );

    let mut first = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut first).await;
    assert!(matches!(events.last(), Some(HopEvent::Succeeded)));

    // re-running a finished hop is rejected
    assert_eq!(
        h.session.execute_hop(0).await.unwrap_err(),
        SessionError::HopAlreadyStarted { index: 0 }
    );

    let mut second = h.session.execute_hop(1).await.unwrap();
    let events = drain_events(&mut second).await;
    assert!(matches!(events.last(), Some(HopEvent::Succeeded)));

    let states = h.session.hop_states().await;
    assert!(states.iter().all(|s| s.state == HopState::Succeeded));

    // both hops went over the wire: one UTXO deposit, one EVM call
    assert_eq!(h.wallet.broadcast_calls().len(), 2);
}

#[tokio::test]
async fn offchain_order_skips_broadcast() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::CowSwap)
            .with_route(single_hop_route("cow-1", SwapperName::CowSwap, 2_000_000))],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut execution = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut execution).await;
    assert!(matches!(events.last(), Some(HopEvent::Succeeded)));

    // the signed order went to the provider, not the chain
    assert_eq!(h.swappers[0].submitted_orders().len(), 1);
    assert!(h.wallet.broadcast_calls().is_empty());
    assert!(h.wallet.signed_transactions().is_empty());

    let hop = h.session.hop_state(0).await.unwrap();
    assert_eq!(hop.sell_tx_id.as_deref(), Some("order-0"));
}

// ============================================================================
// Execution: failure isolation
// ============================================================================

#[tokio::test]
async fn broadcast_failure_fails_hop_without_touching_prior_hops() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::Thorchain)
            .with_route(two_hop_route("tc-1", SwapperName::Thorchain))],
        MockWallet::new().with_broadcast_failure_after(1, "mempool rejected tx"),
    );

    quotes_ready(&h.session, request(btc(), usdc(), 100_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut first = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut first).await;
    assert!(matches!(events.last(), Some(HopEvent::Succeeded)));

    let mut second = h.session.execute_hop(1).await.unwrap();
    let events = drain_events(&mut second).await;
    match events.last() {
        Some(HopEvent::Failed { message }) => assert!(message.contains("mempool rejected tx")),
        other => panic!("expected Failed, got {:?}", other),
    }

    let states = h.session.hop_states().await;
    assert_eq!(states[0].state, HopState::Succeeded);
    assert_eq!(states[0].sell_tx_id.as_deref(), Some("txid-0"));
    assert_eq!(states[1].state, HopState::Failed);
    assert!(states[1]
        .message
        .as_deref()
        .unwrap()
        .contains("mempool rejected tx"));
}

#[tokio::test]
async fn signature_rejection_fails_hop() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::ZeroEx)
            .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))],
        MockWallet::new().with_signing_rejected(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut execution = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut execution).await;

    match events.last() {
        Some(HopEvent::Failed { message }) => assert!(message.contains("rejected")),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(events.len(), 1);
    assert_eq!(
        h.session.hop_state(0).await.unwrap().state,
        HopState::Failed
    );
}

#[tokio::test]
async fn completion_without_destination_tx_is_an_error_event() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::ZeroEx)
            .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))
            .with_statuses([TradeStatus {
                kind: TradeStatusKind::Complete,
                buy_tx_id: None,
                message: Some("settled".to_string()),
            }])],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut execution = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut execution).await;

    match events.last() {
        Some(HopEvent::Error { cause }) => {
            assert!(cause.contains("destination transaction"))
        }
        other => panic!("expected Error, got {:?}", other),
    }
    assert_eq!(
        h.session.hop_state(0).await.unwrap().state,
        HopState::Failed
    );
}

#[tokio::test]
async fn provider_reported_failure_fails_hop() {
    let h = harness(
        vec![MockSwapper::new(SwapperName::ZeroEx)
            .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))
            .with_statuses([
                TradeStatus::pending("indexing"),
                TradeStatus::failed("reverted on chain"),
            ])],
        MockWallet::new(),
    );

    quotes_ready(&h.session, request(eth(), usdc(), 1_000_000)).await;
    h.session.confirm_route().await.unwrap();

    let mut execution = h.session.execute_hop(0).await.unwrap();
    let events = drain_events(&mut execution).await;

    match events.last() {
        Some(HopEvent::Failed { message }) => assert!(message.contains("reverted")),
        other => panic!("expected Failed, got {:?}", other),
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancelling_confirmation_polling_suppresses_further_events() {
    let slow = ExecutionSettings {
        poll_interval: Duration::from_secs(30),
        max_poll_attempts: 20,
    };
    let wallet = Arc::new(MockWallet::new());
    let swapper = Arc::new(
        MockSwapper::new(SwapperName::ZeroEx)
            .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))
            .with_statuses([TradeStatus::pending("indexing")]),
    );
    let registry = ProviderRegistry::new().with_provider(swapper.clone());
    let session = SwapSession::new(Arc::new(registry), wallet.clone()).with_settings(slow);

    quotes_ready(&session, request(eth(), usdc(), 1_000_000)).await;
    session.confirm_route().await.unwrap();

    let mut execution = session.execute_hop(0).await.unwrap();

    // consume up to the first status update, then cancel mid-poll-sleep
    let mut seen_submitted = false;
    let mut seen_status = false;
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = execution.events.recv().await {
            match event {
                HopEvent::SellTransactionSubmitted { .. } => seen_submitted = true,
                HopEvent::StatusUpdate { .. } => {
                    seen_status = true;
                    break;
                }
                other => panic!("unexpected event before cancel: {:?}", other),
            }
        }
    })
    .await
    .unwrap();
    assert!(seen_submitted && seen_status);

    execution.cancel.cancel();

    // no terminal event arrives; the stream just ends
    let rest = tokio::time::timeout(Duration::from_secs(2), async {
        let mut rest = Vec::new();
        while let Some(event) = execution.events.recv().await {
            rest.push(event);
        }
        rest
    })
    .await
    .expect("stream should close after cancellation");
    assert!(rest.iter().all(|e| !e.is_terminal()), "got {:?}", rest);

    // the hop froze where it was, not silently succeeded
    let hop = session.hop_state(0).await.unwrap();
    assert_eq!(hop.state, HopState::Confirming);
    assert_eq!(hop.sell_tx_id.as_deref(), Some("txid-0"));
}

#[tokio::test]
async fn abandon_cancels_execution_and_releases_lock() {
    let slow = ExecutionSettings {
        poll_interval: Duration::from_secs(30),
        max_poll_attempts: 20,
    };
    let h = {
        let wallet = Arc::new(MockWallet::new());
        let swapper = Arc::new(
            MockSwapper::new(SwapperName::ZeroEx)
                .with_route(single_hop_route("zx-1", SwapperName::ZeroEx, 2_000_000))
                .with_statuses([TradeStatus::pending("indexing")]),
        );
        let registry = ProviderRegistry::new().with_provider(swapper.clone());
        SwapSession::new(Arc::new(registry), wallet).with_settings(slow)
    };

    quotes_ready(&h, request(eth(), usdc(), 1_000_000)).await;
    h.confirm_route().await.unwrap();
    let mut execution = h.execute_hop(0).await.unwrap();

    // wait for the submission so polling is definitely in flight
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = execution.events.recv().await {
            if matches!(event, HopEvent::SellTransactionSubmitted { .. }) {
                break;
            }
        }
    })
    .await
    .unwrap();

    h.abandon().await;

    assert!(h.confirmed_route().await.is_none());
    assert!(h.active_route().await.is_some() || h.current_ranking().await.is_ok());
}
