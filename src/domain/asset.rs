//! Asset and Chain Identifiers
//!
//! Chains are identified by CAIP-2 style strings (`eip155:1`, `bip122:...`,
//! `cosmos:cosmoshub-4`) and assets by a chain id plus an on-chain reference.
//! The chain namespace prefix determines which protocol family the engine
//! uses to sign and broadcast.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CAIP-2 style chain identifier, e.g. `eip155:1` or `cosmos:cosmoshub-4`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The namespace prefix before the first `:` (e.g. `eip155`)
    pub fn namespace(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Asset identifier: the chain it lives on plus an on-chain reference
/// (contract address, denom, or slip44 marker for native assets)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetId {
    pub chain_id: ChainId,
    pub reference: String,
}

impl AssetId {
    pub fn new(chain_id: impl Into<ChainId>, reference: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            reference: reference.into(),
        }
    }

    /// Whether both assets live on the same chain
    pub fn same_chain(&self, other: &AssetId) -> bool {
        self.chain_id == other.chain_id
    }

    /// Parse the `<chain>/<reference>` display form back into an id
    pub fn parse(s: &str) -> Option<AssetId> {
        let (chain, reference) = s.split_once('/')?;
        if chain.is_empty() || reference.is_empty() {
            return None;
        }
        Some(AssetId::new(chain, reference))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.reference)
    }
}

/// Raised when a chain id's namespace maps to no known protocol family
#[derive(Debug, Clone, Error)]
#[error("unsupported chain namespace: {0}")]
pub struct UnsupportedChain(pub ChainId);

/// Protocol family of a transaction, the closed set the engine can dispatch on.
///
/// `OffChainMessage` is not derived from a chain namespace: it is selected for
/// hops whose provider settles off-chain signed orders instead of broadcast
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Evm,
    Utxo,
    CosmosSdk,
    OffChainMessage,
}

impl ChainFamily {
    /// Resolve the family for a chain id from its namespace prefix.
    ///
    /// An unknown namespace is a configuration error, never a silent default.
    pub fn of(chain_id: &ChainId) -> Result<ChainFamily, UnsupportedChain> {
        match chain_id.namespace() {
            "eip155" => Ok(ChainFamily::Evm),
            "bip122" => Ok(ChainFamily::Utxo),
            "cosmos" => Ok(ChainFamily::CosmosSdk),
            _ => Err(UnsupportedChain(chain_id.clone())),
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Utxo => "utxo",
            ChainFamily::CosmosSdk => "cosmos_sdk",
            ChainFamily::OffChainMessage => "off_chain_message",
        };
        write!(f, "{}", s)
    }
}
