//! Cosmos-SDK Chain Adapter
//!
//! Bank-send style transfers. The asset reference doubles as the denom (the
//! engine treats it as opaque); IBC/provider routing rides in the memo.

use crate::domain::{ChainFamily, Hop, QuoteRequest, TradeRoute};
use crate::ports::wallet::{CosmosTxRequest, UnsignedTx};

use super::{ChainAdapter, ExecutionError};

pub struct CosmosAdapter;

impl ChainAdapter for CosmosAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::CosmosSdk
    }

    fn build_unsigned(
        &self,
        route: &TradeRoute,
        _hop_index: usize,
        hop: &Hop,
        _request: &QuoteRequest,
        from: &str,
    ) -> Result<UnsignedTx, ExecutionError> {
        let to = hop
            .deposit_address
            .clone()
            .unwrap_or_else(|| route.receive_address.clone());

        Ok(UnsignedTx::Cosmos(CosmosTxRequest {
            chain_id: hop.sell_asset.chain_id.clone(),
            from: from.to_string(),
            to,
            amount: hop.sell_amount_incl_fees,
            denom: hop.sell_asset.reference.clone(),
            memo: hop.memo.clone(),
        }))
    }
}
