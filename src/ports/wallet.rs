//! Wallet Capability Port
//!
//! The externally-owned wallet boundary: address derivation, signing, and
//! broadcast. The engine never constructs raw protocol bytes; it hands the
//! wallet a family-tagged unsigned transaction built from the hop's generic
//! transaction request and gets back an opaque signed payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ChainFamily, ChainId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
    /// The user declined the signature prompt
    #[error("signature rejected by user")]
    Rejected,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("address derivation failed: {0}")]
    Derivation(String),

    #[error("unsupported payload: {0}")]
    UnsupportedPayload(String),
}

/// EVM transaction request: account/nonce model, optional calldata target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTxRequest {
    pub chain_id: ChainId,
    pub from: String,
    pub to: String,
    /// Native value transferred, base units (wei)
    pub value: u128,
    /// Base64 calldata when the hop interacts with a contract
    pub data: Option<String>,
    /// Use the fee-bump (EIP-1559 style) fee mechanism if the wallet can
    pub use_fee_bump: bool,
}

/// UTXO transaction request: output to a single destination, optional
/// OP_RETURN memo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoTxRequest {
    pub chain_id: ChainId,
    pub account_number: u32,
    pub to: String,
    /// Satoshis (or the chain's smallest unit)
    pub amount: u128,
    pub op_return_memo: Option<String>,
}

/// Cosmos-SDK bank-send style request with memo routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmosTxRequest {
    pub chain_id: ChainId,
    pub from: String,
    pub to: String,
    pub amount: u128,
    pub denom: String,
    pub memo: Option<String>,
}

/// Off-chain order message awaiting signature, base64 JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMessage {
    pub payload: String,
}

/// Family-tagged unsigned transaction. The closed variant set mirrors
/// [`ChainFamily`]; adding a protocol family is a compile-time-checked
/// change everywhere this is matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "family", content = "request")]
pub enum UnsignedTx {
    Evm(EvmTxRequest),
    Utxo(UtxoTxRequest),
    Cosmos(CosmosTxRequest),
    Message(OrderMessage),
}

impl UnsignedTx {
    pub fn family(&self) -> ChainFamily {
        match self {
            UnsignedTx::Evm(_) => ChainFamily::Evm,
            UnsignedTx::Utxo(_) => ChainFamily::Utxo,
            UnsignedTx::Cosmos(_) => ChainFamily::CosmosSdk,
            UnsignedTx::Message(_) => ChainFamily::OffChainMessage,
        }
    }
}

/// Opaque signed payload as produced by the wallet, base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub family: ChainFamily,
    pub data: String,
}

/// The wallet boundary. Signing may block indefinitely while the user
/// decides; callers wrap these futures in their own cancellation.
#[async_trait]
pub trait WalletPort: Send + Sync {
    async fn derive_address(
        &self,
        chain: &ChainId,
        account_number: u32,
    ) -> Result<String, WalletError>;

    async fn sign_transaction(&self, tx: &UnsignedTx) -> Result<SignedPayload, WalletError>;

    /// Sign raw message bytes (off-chain orders)
    async fn sign_message(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError>;

    /// Broadcast a signed payload, returning the transaction id
    async fn broadcast(
        &self,
        chain: &ChainId,
        payload: &SignedPayload,
    ) -> Result<String, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_tx_family() {
        let tx = UnsignedTx::Utxo(UtxoTxRequest {
            chain_id: ChainId::from("bip122:000000000019d6689c085ae165831e93"),
            account_number: 0,
            to: "bc1qvault".to_string(),
            amount: 100_000,
            op_return_memo: Some("=:ETH.ETH:0xrecv".to_string()),
        });
        assert_eq!(tx.family(), ChainFamily::Utxo);
    }

    #[test]
    fn test_unsigned_tx_serializes_with_family_tag() {
        let tx = UnsignedTx::Evm(EvmTxRequest {
            chain_id: ChainId::from("eip155:1"),
            from: "0xsend".to_string(),
            to: "0xrouter".to_string(),
            value: 1_000,
            data: None,
            use_fee_bump: true,
        });

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["family"], "evm");
        assert_eq!(json["request"]["useFeeBump"], true);
    }
}
