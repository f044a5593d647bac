//! UTXO Chain Adapter
//!
//! UTXO hops always settle through a provider deposit address (there is no
//! contract to call); routing instructions ride in an OP_RETURN memo.

use crate::domain::{ChainFamily, Hop, QuoteRequest, TradeRoute};
use crate::ports::wallet::{UnsignedTx, UtxoTxRequest};

use super::{ChainAdapter, ExecutionError};

pub struct UtxoAdapter;

impl ChainAdapter for UtxoAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Utxo
    }

    fn build_unsigned(
        &self,
        _route: &TradeRoute,
        _hop_index: usize,
        hop: &Hop,
        _request: &QuoteRequest,
        _from: &str,
    ) -> Result<UnsignedTx, ExecutionError> {
        let to = hop.deposit_address.clone().ok_or_else(|| {
            ExecutionError::InvalidHop("utxo hop requires a deposit address".to_string())
        })?;

        Ok(UnsignedTx::Utxo(UtxoTxRequest {
            chain_id: hop.sell_asset.chain_id.clone(),
            account_number: hop.account_number,
            to,
            amount: hop.sell_amount_incl_fees,
            op_return_memo: hop.memo.clone(),
        }))
    }
}
