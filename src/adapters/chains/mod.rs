//! Chain Adapter Dispatch
//!
//! Closed mapping from protocol family to the strategy used to derive the
//! signing address, construct the family-native unsigned transaction, sign
//! it, and submit it. The match over [`ChainFamily`] is exhaustive: adding a
//! family is a compile-time-checked change, and a chain id whose namespace
//! resolves to no family is a fatal configuration error, never a no-op.

mod cosmos;
mod evm;
mod message;
mod utxo;

pub use cosmos::CosmosAdapter;
pub use evm::EvmAdapter;
pub use message::MessageAdapter;
pub use utxo::UtxoAdapter;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ChainFamily, ChainId, Hop, QuoteRequest, TradeRoute, UnsupportedChain};
use crate::ports::quote_provider::{QuoteError, QuoteProvider};
use crate::ports::wallet::{SignedPayload, UnsignedTx, WalletError, WalletPort};

/// Failures terminal for the current hop only. Hops already succeeded are
/// never unwound by these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(ChainId),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("provider error: {0}")]
    Provider(#[from] QuoteError),

    #[error("invalid hop: {0}")]
    InvalidHop(String),

    #[error("destination transaction not observed at completion")]
    MissingDestinationTx,

    #[error("confirmation timed out after {attempts} attempts")]
    ConfirmationTimeout { attempts: u32 },
}

impl From<UnsupportedChain> for ExecutionError {
    fn from(err: UnsupportedChain) -> Self {
        ExecutionError::UnsupportedChain(err.0)
    }
}

/// Resolve the dispatch family for a hop: providers that settle off-chain
/// signed orders take the message path, everything else follows the sell
/// chain's namespace.
pub fn resolve_family(hop: &Hop) -> Result<ChainFamily, ExecutionError> {
    if hop.source.uses_offchain_orders() {
        return Ok(ChainFamily::OffChainMessage);
    }
    Ok(ChainFamily::of(&hop.sell_asset.chain_id)?)
}

/// Per-family signing/broadcast strategy
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Address the hop's sell-side transaction signs from
    async fn signing_address(
        &self,
        wallet: &dyn WalletPort,
        hop: &Hop,
    ) -> Result<String, ExecutionError> {
        Ok(wallet
            .derive_address(&hop.sell_asset.chain_id, hop.account_number)
            .await?)
    }

    /// Build the family-native unsigned transaction from the hop's generic
    /// transaction request
    fn build_unsigned(
        &self,
        route: &TradeRoute,
        hop_index: usize,
        hop: &Hop,
        request: &QuoteRequest,
        from: &str,
    ) -> Result<UnsignedTx, ExecutionError>;

    /// Request a signature from the wallet; may block until the user decides
    async fn sign(
        &self,
        wallet: &dyn WalletPort,
        tx: &UnsignedTx,
    ) -> Result<SignedPayload, ExecutionError> {
        Ok(wallet.sign_transaction(tx).await?)
    }

    /// Put the signed payload on the wire: broadcast to the chain, or for
    /// the off-chain variant, hand the order to the settling provider.
    /// Returns the sell-side transaction (or order) id.
    async fn submit(
        &self,
        wallet: &dyn WalletPort,
        _provider: &dyn QuoteProvider,
        _route: &TradeRoute,
        _hop_index: usize,
        hop: &Hop,
        payload: &SignedPayload,
    ) -> Result<String, ExecutionError> {
        Ok(wallet
            .broadcast(&hop.sell_asset.chain_id, payload)
            .await?)
    }
}

static EVM: EvmAdapter = EvmAdapter;
static UTXO: UtxoAdapter = UtxoAdapter;
static COSMOS: CosmosAdapter = CosmosAdapter;
static MESSAGE: MessageAdapter = MessageAdapter;

/// Select the adapter for a protocol family
pub fn adapter_for(family: ChainFamily) -> &'static dyn ChainAdapter {
    match family {
        ChainFamily::Evm => &EVM,
        ChainFamily::Utxo => &UTXO,
        ChainFamily::CosmosSdk => &COSMOS,
        ChainFamily::OffChainMessage => &MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, SwapperName};

    #[test]
    fn test_adapter_for_covers_every_family() {
        for family in [
            ChainFamily::Evm,
            ChainFamily::Utxo,
            ChainFamily::CosmosSdk,
            ChainFamily::OffChainMessage,
        ] {
            assert_eq!(adapter_for(family).family(), family);
        }
    }

    #[test]
    fn test_resolve_family_prefers_offchain_providers() {
        let hop = Hop::fixed_rate_bridge(
            AssetId::new("eip155:1", "slip44:60"),
            AssetId::new("eip155:1", "erc20:0xusdc"),
            0,
            100,
            SwapperName::CowSwap,
        );
        assert_eq!(resolve_family(&hop).unwrap(), ChainFamily::OffChainMessage);
    }

    #[test]
    fn test_resolve_family_from_namespace() {
        let hop = Hop::fixed_rate_bridge(
            AssetId::new("cosmos:osmosis-1", "uosmo"),
            AssetId::new("cosmos:cosmoshub-4", "uatom"),
            0,
            100,
            SwapperName::Osmosis,
        );
        assert_eq!(resolve_family(&hop).unwrap(), ChainFamily::CosmosSdk);
    }

    #[test]
    fn test_resolve_family_unknown_namespace_fails() {
        let hop = Hop::fixed_rate_bridge(
            AssetId::new("solana:mainnet", "sol"),
            AssetId::new("eip155:1", "slip44:60"),
            0,
            100,
            SwapperName::LiFi,
        );
        assert!(matches!(
            resolve_family(&hop),
            Err(ExecutionError::UnsupportedChain(_))
        ));
    }
}
