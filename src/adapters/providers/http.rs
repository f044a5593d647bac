//! Provider HTTP Client
//!
//! Reqwest adapter implementing the swapper contract against the provider
//! REST shape (GET /quote, GET /status, POST /orders). Handles retries with
//! exponential backoff on rate limits, maps HTTP and body errors into
//! structured quote errors, and converts the wire route (string amounts,
//! camelCase) into domain types.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AssetId, BridgeDirection, FeeData, Hop, NetworkFee, ProtocolFee, QuoteRequest, RouteId,
    SwapperName, TradeRoute,
};
use crate::ports::quote_provider::{QuoteError, TradeStatus, TradeStatusKind};

/// Per-provider HTTP configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider's quote API
    pub base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Number of retry attempts
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// HTTP-backed quote provider
#[derive(Debug, Clone)]
pub struct HttpQuoteProvider {
    name: SwapperName,
    config: ProviderConfig,
    http: Client,
}

impl HttpQuoteProvider {
    pub fn new(name: SwapperName, config: ProviderConfig) -> Result<Self, QuoteError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::RequestFailed(format!("http client: {}", e)))?;

        Ok(Self { name, config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<WireRoute, QuoteError> {
        let url = format!("{}/quote", self.config.base_url);

        let mut req = self.http.get(&url).query(&[
            ("sellAsset", request.sell_asset.to_string()),
            ("buyAsset", request.buy_asset.to_string()),
            ("sellAmount", request.sell_amount.to_string()),
            ("accountNumber", request.account_number.to_string()),
            ("receiveAddress", request.receive_address.clone()),
            ("sendAddress", request.send_address.clone()),
            (
                "supportsFeeBump",
                request.capabilities.supports_fee_bump.to_string(),
            ),
        ]);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::RequestFailed("failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| QuoteError::RequestFailed(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    async fn get_status(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        sell_tx_id: &str,
    ) -> Result<WireStatus, QuoteError> {
        let url = format!(
            "{}/status/{}/{}",
            self.config.base_url, route_id, hop_index
        );

        let mut req = self.http.get(&url).query(&[("sellTxId", sell_tx_id)]);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::RequestFailed("failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| QuoteError::RequestFailed(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    async fn post_order(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        signed_payload: &str,
    ) -> Result<WireOrderAck, QuoteError> {
        let url = format!("{}/orders", self.config.base_url);
        let body = WireOrderSubmission {
            route_id: route_id.to_string(),
            hop_index,
            signed_payload: signed_payload.to_string(),
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| QuoteError::RequestFailed("failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| QuoteError::RequestFailed(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    /// Execute request with retry logic and rate limit handling
    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, QuoteError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, QuoteError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match request_fn().await {
                Ok(response) => {
                    if response.status() == StatusCode::TOO_MANY_REQUESTS {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                        tracing::warn!(
                            provider = %self.name,
                            "rate limited (429), backing off for {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            self.config.max_retries
                        );
                        last_error = Some(QuoteError::RequestFailed("rate limit exceeded".into()));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if response.status().is_server_error() {
                        last_error = Some(QuoteError::RequestFailed(format!(
                            "server error: {}",
                            response.status()
                        )));
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(e);
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| QuoteError::RequestFailed("max retries exceeded".into())))
    }

    /// Map the response into a wire type, or a structured quote error
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, QuoteError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_body(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::RequestFailed(format!("failed to parse response: {}", e)))
    }
}

// Linear backoff with a little jitter so concurrent providers don't retry
// in lockstep.
fn retry_delay(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(500 * (attempt as u64 + 1) + jitter)
}

/// Structured error body, when the provider sends one
#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    code: String,
    #[serde(default)]
    message: String,
}

fn map_error_body(status: StatusCode, body: &str) -> QuoteError {
    if let Ok(wire) = serde_json::from_str::<WireError>(body) {
        let message = if wire.error.message.is_empty() {
            wire.error.code.clone()
        } else {
            wire.error.message
        };
        return match wire.error.code.as_str() {
            "UNSUPPORTED_PAIR" => QuoteError::UnsupportedTradePair(message),
            "INSUFFICIENT_LIQUIDITY" => QuoteError::InsufficientLiquidity(message),
            "FEE_ESTIMATION_FAILED" => QuoteError::NetworkFeeEstimationFailed(message),
            _ => QuoteError::ValidationFailed(message),
        };
    }

    QuoteError::RequestFailed(format!("api error {}: {}", status, body))
}

#[async_trait::async_trait]
impl crate::ports::quote_provider::QuoteProvider for HttpQuoteProvider {
    fn name(&self) -> SwapperName {
        self.name
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<TradeRoute, QuoteError> {
        let wire = self.get_quote(request).await?;
        wire.into_route(self.name)
    }

    async fn trade_status(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        sell_tx_id: &str,
    ) -> Result<TradeStatus, QuoteError> {
        let wire = self.get_status(route_id, hop_index, sell_tx_id).await?;
        wire.into_status()
    }

    async fn submit_signed_order(
        &self,
        route_id: &RouteId,
        hop_index: usize,
        signed_payload: &str,
    ) -> Result<String, QuoteError> {
        let ack = self.post_order(route_id, hop_index, signed_payload).await?;
        Ok(ack.order_id)
    }
}

// ---------------------------------------------------------------------------
// Wire types. Amounts are strings on the wire (precision survives any JSON
// number handling); conversion failures surface as validation errors.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoute {
    pub id: String,
    pub rate: String,
    #[serde(default)]
    pub affiliate_bps: u16,
    pub slippage_tolerance: String,
    pub receive_address: String,
    pub steps: Vec<WireHop>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHop {
    pub sell_asset: AssetId,
    pub buy_asset: AssetId,
    pub account_number: u32,
    pub sell_amount_incl_fees: String,
    pub buy_amount_before_fees: String,
    pub buy_amount_after_fees: String,
    #[serde(default)]
    pub network_fee: Option<WireFee>,
    #[serde(default)]
    pub protocol_fees: Vec<WireFee>,
    #[serde(default)]
    pub estimated_execution_time_secs: u64,
    #[serde(default)]
    pub allowance_contract: Option<String>,
    #[serde(default)]
    pub deposit_address: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub bridge: Option<BridgeDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFee {
    pub asset: AssetId,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStatus {
    pub status: String,
    #[serde(default)]
    pub buy_tx_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOrderSubmission {
    route_id: String,
    hop_index: usize,
    signed_payload: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrderAck {
    order_id: String,
}

fn parse_amount(field: &str, value: &str) -> Result<u128, QuoteError> {
    value
        .parse::<u128>()
        .map_err(|_| QuoteError::ValidationFailed(format!("bad {}: {:?}", field, value)))
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, QuoteError> {
    value
        .parse::<Decimal>()
        .map_err(|_| QuoteError::ValidationFailed(format!("bad {}: {:?}", field, value)))
}

impl WireRoute {
    pub fn into_route(self, source: SwapperName) -> Result<TradeRoute, QuoteError> {
        let rate = parse_decimal("rate", &self.rate)?;
        let slippage = parse_decimal("slippageTolerance", &self.slippage_tolerance)?;

        let mut hops = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let network_fee = match step.network_fee {
                Some(fee) => Some(NetworkFee {
                    amount: parse_amount("networkFee", &fee.amount)?,
                    asset: fee.asset,
                }),
                None => None,
            };
            let mut protocol_fees = Vec::with_capacity(step.protocol_fees.len());
            for fee in step.protocol_fees {
                protocol_fees.push(ProtocolFee {
                    amount: parse_amount("protocolFee", &fee.amount)?,
                    asset: fee.asset,
                });
            }

            hops.push(Hop {
                sell_asset: step.sell_asset,
                buy_asset: step.buy_asset,
                account_number: step.account_number,
                sell_amount_incl_fees: parse_amount(
                    "sellAmountInclFees",
                    &step.sell_amount_incl_fees,
                )?,
                buy_amount_before_fees: parse_amount(
                    "buyAmountBeforeFees",
                    &step.buy_amount_before_fees,
                )?,
                buy_amount_after_fees: parse_amount(
                    "buyAmountAfterFees",
                    &step.buy_amount_after_fees,
                )?,
                fee_data: FeeData {
                    network_fee,
                    protocol_fees,
                },
                estimated_execution_time_secs: step.estimated_execution_time_secs,
                source,
                allowance_contract: step.allowance_contract,
                deposit_address: step.deposit_address,
                memo: step.memo,
                bridge: step.bridge,
            });
        }

        TradeRoute::try_new(
            RouteId::new(self.id),
            hops,
            rate,
            self.affiliate_bps,
            slippage,
            self.receive_address,
        )
        .map_err(|e| QuoteError::ValidationFailed(e.to_string()))
    }
}

impl WireStatus {
    pub fn into_status(self) -> Result<TradeStatus, QuoteError> {
        let kind = match self.status.as_str() {
            "pending" => TradeStatusKind::Pending,
            "complete" => TradeStatusKind::Complete,
            "failed" => TradeStatusKind::Failed,
            other => {
                return Err(QuoteError::ValidationFailed(format!(
                    "unknown trade status: {:?}",
                    other
                )))
            }
        };
        Ok(TradeStatus {
            kind,
            buy_tx_id: self.buy_tx_id,
            message: self.message,
        })
    }
}
