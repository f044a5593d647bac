//! Off-Chain Order Adapter
//!
//! For providers that settle signed orders instead of broadcast
//! transactions. The hop's terms are serialized into an order payload, the
//! wallet signs the raw bytes, and the signed order goes back to the owning
//! provider, which returns the id the confirmation poll tracks. Broadcasting
//! is skipped entirely.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use crate::domain::{ChainFamily, Hop, QuoteRequest, TradeRoute};
use crate::ports::quote_provider::QuoteProvider;
use crate::ports::wallet::{OrderMessage, SignedPayload, UnsignedTx, WalletError, WalletPort};

use super::{ChainAdapter, ExecutionError};

/// The order terms the wallet is asked to sign
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderTerms<'a> {
    route_id: &'a str,
    hop_index: usize,
    sell_asset: String,
    buy_asset: String,
    sell_amount: String,
    buy_amount_after_fees: String,
    receive_address: &'a str,
    from: &'a str,
}

pub struct MessageAdapter;

#[async_trait]
impl ChainAdapter for MessageAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::OffChainMessage
    }

    fn build_unsigned(
        &self,
        route: &TradeRoute,
        hop_index: usize,
        hop: &Hop,
        _request: &QuoteRequest,
        from: &str,
    ) -> Result<UnsignedTx, ExecutionError> {
        let terms = OrderTerms {
            route_id: route.id.as_str(),
            hop_index,
            sell_asset: hop.sell_asset.to_string(),
            buy_asset: hop.buy_asset.to_string(),
            sell_amount: hop.sell_amount_incl_fees.to_string(),
            buy_amount_after_fees: hop.buy_amount_after_fees.to_string(),
            receive_address: &route.receive_address,
            from,
        };
        let body = serde_json::to_vec(&terms)
            .map_err(|e| ExecutionError::InvalidHop(format!("order serialization: {}", e)))?;

        Ok(UnsignedTx::Message(OrderMessage {
            payload: BASE64.encode(body),
        }))
    }

    async fn sign(
        &self,
        wallet: &dyn WalletPort,
        tx: &UnsignedTx,
    ) -> Result<SignedPayload, ExecutionError> {
        let message = match tx {
            UnsignedTx::Message(m) => m,
            other => {
                return Err(ExecutionError::from(WalletError::UnsupportedPayload(
                    format!("message adapter got a {} transaction", other.family()),
                )))
            }
        };

        let bytes = BASE64
            .decode(&message.payload)
            .map_err(|e| ExecutionError::InvalidHop(format!("order payload: {}", e)))?;
        let signature = wallet.sign_message(&bytes).await?;

        Ok(SignedPayload {
            family: ChainFamily::OffChainMessage,
            data: BASE64.encode(signature),
        })
    }

    async fn submit(
        &self,
        _wallet: &dyn WalletPort,
        provider: &dyn QuoteProvider,
        route: &TradeRoute,
        hop_index: usize,
        _hop: &Hop,
        payload: &SignedPayload,
    ) -> Result<String, ExecutionError> {
        Ok(provider
            .submit_signed_order(&route.id, hop_index, &payload.data)
            .await?)
    }
}
