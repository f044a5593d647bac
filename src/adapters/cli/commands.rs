//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the portage engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::providers::ProviderRegistry;
use crate::application::{ExecutionSettings, HopEvent, SwapSession};
use crate::config::load_config;
use crate::domain::{
    AssetId, PriceBook, QuoteRequest, RequestContext, SwapperName, WalletCapabilities,
};
use crate::ports::mocks::MockWallet;

/// Portage - Cross-Chain Swap Route Aggregation and Execution Engine
#[derive(Parser, Debug)]
#[command(
    name = "portage",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Cross-chain swap route aggregation and execution engine",
    long_about = "Portage fans a conversion request out to independent swap providers, \
                  ranks the quotes into a single best executable route, and drives \
                  execution hop by hop across protocol families."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch quotes from all enabled providers and print the ranking
    Quote(QuoteCmd),

    /// List configured providers
    Providers(ProvidersCmd),

    /// Execute the best route in paper mode (mock wallet, no real signing)
    Execute(ExecuteCmd),
}

/// Fetch and rank quotes
#[derive(Parser, Debug)]
pub struct QuoteCmd {
    /// Sell asset id (e.g. eip155:1/slip44:60)
    #[arg(value_name = "SELL")]
    pub sell_asset: String,

    /// Buy asset id (e.g. cosmos:cosmoshub-4/slip44:118)
    #[arg(value_name = "BUY")]
    pub buy_asset: String,

    /// Sell amount in base units
    #[arg(value_name = "AMOUNT")]
    pub amount: u128,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Account number to quote for
    #[arg(long, value_name = "N", default_value = "0")]
    pub account: u32,

    /// Receive address on the buy chain
    #[arg(long, value_name = "ADDR", default_value = "")]
    pub receive_address: String,

    /// Send address on the sell chain
    #[arg(long, value_name = "ADDR", default_value = "")]
    pub send_address: String,

    /// Reference price per base unit, repeatable (e.g. --price "eip155:1/slip44:60=0.000000000000002")
    #[arg(long, value_name = "ASSET=PRICE")]
    pub price: Vec<String>,

    /// Seconds to wait for providers before printing
    #[arg(long, value_name = "SECS", default_value = "20")]
    pub wait: u64,
}

/// List configured providers
#[derive(Parser, Debug)]
pub struct ProvidersCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Execute the best route in paper mode
#[derive(Parser, Debug)]
pub struct ExecuteCmd {
    /// Sell asset id
    #[arg(value_name = "SELL")]
    pub sell_asset: String,

    /// Buy asset id
    #[arg(value_name = "BUY")]
    pub buy_asset: String,

    /// Sell amount in base units
    #[arg(value_name = "AMOUNT")]
    pub amount: u128,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Receive address on the buy chain
    #[arg(long, value_name = "ADDR", default_value = "")]
    pub receive_address: String,

    /// Send address on the sell chain
    #[arg(long, value_name = "ADDR", default_value = "")]
    pub send_address: String,

    /// Confirm execution without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Seconds to wait for providers before ranking
    #[arg(long, value_name = "SECS", default_value = "20")]
    pub wait: u64,
}

/// Handle quote command
pub async fn quote_command(cmd: QuoteCmd) -> Result<()> {
    let (session, request, ctx) = build_session(
        &cmd.config,
        &cmd.sell_asset,
        &cmd.buy_asset,
        cmd.amount,
        cmd.account,
        &cmd.receive_address,
        &cmd.send_address,
    )
    .await?;
    session.set_price_book(parse_price_book(&cmd.price)?).await;

    tracing::info!("Fetching quotes: {} -> {}", cmd.sell_asset, cmd.buy_asset);
    session
        .request_quotes(request, &ctx)
        .await
        .context("quote request rejected")?;

    let _ = tokio::time::timeout(Duration::from_secs(cmd.wait), session.await_quotes()).await;

    match session.current_ranking().await {
        Ok(ranking) if ranking.is_empty() => {
            println!("No routes yet; providers may still be answering.");
        }
        Ok(ranking) => {
            println!(
                "{:<12} {:<16} {:>20} {:>14} {:>8}",
                "Provider", "Route", "Buy (base units)", "Net value", "Est (s)"
            );
            for ranked in &ranking {
                println!(
                    "{:<12} {:<16} {:>20} {:>14} {:>8}",
                    ranked.source.to_string(),
                    ranked.route.id.to_string(),
                    ranked.route.buy_amount_after_fees(),
                    ranked.metrics.effective_value,
                    ranked.metrics.total_execution_time_secs,
                );
            }
            if let Some(active) = session.active_route().await {
                println!("\nBest route: {} ({})", active.route.id, active.swapper);
            }
        }
        Err(e) => println!("No quotes available: {}", e),
    }

    print_provider_errors(&session).await;
    Ok(())
}

/// Handle providers command
pub async fn providers_command(cmd: ProvidersCmd) -> Result<()> {
    let config = load_config(&expand_path(&cmd.config)).context("Failed to load configuration")?;

    println!("{:<12} {:<9} {}", "Provider", "Enabled", "Base URL");
    for name in SwapperName::ALL {
        let entry = config
            .providers
            .iter()
            .find(|(key, _)| SwapperName::parse(key) == Some(name));
        match entry {
            Some((key, entry)) => println!(
                "{:<12} {:<9} {}",
                name.to_string(),
                entry.enabled,
                entry.base_url_with_env(key)
            ),
            None => println!("{:<12} {:<9} -", name.to_string(), "-"),
        }
    }
    Ok(())
}

/// Handle execute command (paper mode)
pub async fn execute_command(cmd: ExecuteCmd) -> Result<()> {
    if !cmd.yes {
        bail!("paper execution signs with a mock wallet; pass --yes to proceed");
    }

    let (session, request, ctx) = build_session(
        &cmd.config,
        &cmd.sell_asset,
        &cmd.buy_asset,
        cmd.amount,
        0,
        &cmd.receive_address,
        &cmd.send_address,
    )
    .await?;

    session
        .request_quotes(request, &ctx)
        .await
        .context("quote request rejected")?;
    let _ = tokio::time::timeout(Duration::from_secs(cmd.wait), session.await_quotes()).await;

    let confirmed = session
        .confirm_route()
        .await
        .context("no executable route")?;
    println!(
        "Executing route {} via {} ({} hops, paper mode)",
        confirmed.route.id,
        confirmed.swapper,
        confirmed.route.hops.len()
    );

    for index in 0..confirmed.route.hops.len() {
        println!("\nHop {}:", index);
        let mut execution = session.execute_hop(index).await?;

        let mut succeeded = false;
        while let Some(event) = execution.events.recv().await {
            match &event {
                HopEvent::SellTransactionSubmitted { tx_id } => {
                    println!("  submitted: {}", tx_id);
                }
                HopEvent::StatusUpdate { message, buy_tx_id } => match buy_tx_id {
                    Some(buy) => println!("  status: {} (buy tx {})", message, buy),
                    None => println!("  status: {}", message),
                },
                HopEvent::Succeeded => {
                    println!("  hop succeeded");
                    succeeded = true;
                }
                HopEvent::Failed { message } => println!("  hop failed: {}", message),
                HopEvent::Error { cause } => println!("  hop errored: {}", cause),
            }
            if event.is_terminal() {
                break;
            }
        }

        if !succeeded {
            session.release_confirmed_route().await;
            bail!("execution stopped at hop {}", index);
        }
    }

    session.release_confirmed_route().await;
    println!("\nTrade complete.");
    Ok(())
}

async fn build_session(
    config_path: &PathBuf,
    sell: &str,
    buy: &str,
    amount: u128,
    account: u32,
    receive_address: &str,
    send_address: &str,
) -> Result<(SwapSession, QuoteRequest, RequestContext)> {
    let config = load_config(expand_path(config_path)).context("Failed to load configuration")?;

    let sell_asset =
        AssetId::parse(sell).with_context(|| format!("bad sell asset id: {}", sell))?;
    let buy_asset = AssetId::parse(buy).with_context(|| format!("bad buy asset id: {}", buy))?;

    let registry =
        ProviderRegistry::from_config(&config).context("Failed to build provider registry")?;

    let session = SwapSession::new(Arc::new(registry), Arc::new(MockWallet::new()))
        .with_settings(ExecutionSettings::from_config(&config.engine));

    let request = QuoteRequest {
        sell_asset,
        buy_asset,
        sell_amount: amount,
        account_number: account,
        receive_address: receive_address.to_string(),
        send_address: send_address.to_string(),
        capabilities: WalletCapabilities {
            supports_fee_bump: config.wallet.supports_fee_bump,
        },
    };
    // the CLI has no balance source; the precondition pass still checks
    // wallet presence, chain support, and a non-zero amount
    let ctx = RequestContext::permissive(config.wallet.chain_ids());

    Ok((session, request, ctx))
}

fn parse_price_book(entries: &[String]) -> Result<PriceBook> {
    let mut book = PriceBook::new();
    for entry in entries {
        let (asset, price) = entry
            .split_once('=')
            .with_context(|| format!("bad price entry: {}", entry))?;
        let asset =
            AssetId::parse(asset).with_context(|| format!("bad asset in price entry: {}", asset))?;
        let price: Decimal = price
            .parse()
            .with_context(|| format!("bad price in price entry: {}", price))?;
        book = book.with_price(asset, price);
    }
    Ok(book)
}

async fn print_provider_errors(session: &SwapSession) {
    let errors = session.provider_errors().await;
    if !errors.is_empty() {
        println!();
        for (name, error) in errors {
            println!("{}: {}", name, error);
        }
    }
    for (name, warnings) in session.provider_warnings().await {
        for warning in warnings {
            println!("{}: warning: {}", name, warning);
        }
    }
}

fn expand_path(path: &PathBuf) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.display().to_string()).to_string())
}
