//! EVM Chain Adapter
//!
//! Account/nonce model. The sell-side transaction targets the hop's deposit
//! address when the provider settles via inbound transfers, otherwise the
//! allowance/router contract, with the wallet's fee-bump capability carried
//! through to fee construction.

use crate::domain::{ChainFamily, Hop, QuoteRequest, TradeRoute};
use crate::ports::wallet::{EvmTxRequest, UnsignedTx};

use super::{ChainAdapter, ExecutionError};

pub struct EvmAdapter;

impl ChainAdapter for EvmAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn build_unsigned(
        &self,
        route: &TradeRoute,
        _hop_index: usize,
        hop: &Hop,
        request: &QuoteRequest,
        from: &str,
    ) -> Result<UnsignedTx, ExecutionError> {
        let to = hop
            .deposit_address
            .clone()
            .or_else(|| hop.allowance_contract.clone())
            .unwrap_or_else(|| route.receive_address.clone());

        Ok(UnsignedTx::Evm(EvmTxRequest {
            chain_id: hop.sell_asset.chain_id.clone(),
            from: from.to_string(),
            to,
            value: hop.sell_amount_incl_fees,
            data: None,
            use_fee_bump: request.capabilities.supports_fee_bump,
        }))
    }
}
