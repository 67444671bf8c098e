//! # Chain Entities
//!
//! The chain-facing types the gateway reasons about when it validates a
//! request: epochs, block identifiers, tipsets and their keys.
//!
//! ## Clusters
//!
//! - **Chain**: `Cid`, `BlockHeader`, `TipSet`, `TipSetKey`
//! - **Accounts**: `Address`, `Actor`, `BigInt`

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export U256 from primitive-types for token amounts across the workspace
pub use primitive_types::U256;

/// Token amounts (balances, collateral, gas premiums).
pub type BigInt = U256;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A chain epoch (height). Strictly increasing along the chain.
pub type ChainEpoch = i64;

/// Sentinel accepted by message search methods meaning "search without a
/// lookback bound".
pub const LOOKBACK_NO_LIMIT: ChainEpoch = -1;

/// Content identifier of a block, message or state object.
///
/// Kept as its canonical string form; the gateway never needs to inspect
/// the multihash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(pub String);

impl Cid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An account address in its string form (`f01234`, `t3...`, `0x...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ordered list of block CIDs identifying one point of the chain.
///
/// The empty key means "the current head"; callers pass it when they do not
/// care about a specific historical point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(pub Vec<Cid>);

impl TipSetKey {
    /// Key for the current head.
    pub const EMPTY: TipSetKey = TipSetKey(Vec::new());

    pub fn new(cids: Vec<Cid>) -> Self {
        Self(cids)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cids(&self) -> &[Cid] {
        &self.0
    }
}

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, cid) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{cid}")?;
        }
        f.write_str("}")
    }
}

/// The header of a block as far as the gateway cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockHeader {
    /// Block CID.
    pub cid: Cid,
    /// Miner that produced the block.
    pub miner: Address,
    /// Epoch the block was produced at.
    pub height: ChainEpoch,
    /// Unix timestamp (seconds) of the block.
    pub timestamp: u64,
    /// Parent tipset.
    pub parents: Vec<Cid>,
    /// State root after applying the parent tipset.
    pub parent_state_root: Cid,
}

/// A tipset could not be assembled from the given blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TipSetError {
    /// A tipset always holds at least one block.
    #[error("tipset must contain at least one block")]
    Empty,

    /// All blocks of a tipset share one height.
    #[error("mismatched block heights in tipset: {first} != {other}")]
    MismatchedHeight {
        first: ChainEpoch,
        other: ChainEpoch,
    },
}

/// A set of blocks at one height of the chain.
///
/// Invariant: `blocks` is never empty, enforced by [`TipSet::new`] and by
/// deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTipSet", into = "RawTipSet")]
pub struct TipSet {
    key: TipSetKey,
    blocks: Vec<BlockHeader>,
    height: ChainEpoch,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTipSet {
    cids: Vec<Cid>,
    blocks: Vec<BlockHeader>,
    height: ChainEpoch,
}

impl TryFrom<RawTipSet> for TipSet {
    type Error = TipSetError;

    fn try_from(raw: RawTipSet) -> Result<Self, Self::Error> {
        TipSet::new(raw.blocks)
    }
}

impl From<TipSet> for RawTipSet {
    fn from(ts: TipSet) -> Self {
        RawTipSet {
            cids: ts.key.0,
            blocks: ts.blocks,
            height: ts.height,
        }
    }
}

impl TipSet {
    /// Build a tipset from its blocks; the key is derived from block CIDs.
    pub fn new(blocks: Vec<BlockHeader>) -> Result<Self, TipSetError> {
        let first = blocks.first().ok_or(TipSetError::Empty)?;
        let height = first.height;
        if let Some(other) = blocks.iter().find(|b| b.height != height) {
            return Err(TipSetError::MismatchedHeight {
                first: height,
                other: other.height,
            });
        }
        let key = TipSetKey(blocks.iter().map(|b| b.cid.clone()).collect());
        Ok(Self {
            key,
            blocks,
            height,
        })
    }

    pub fn key(&self) -> &TipSetKey {
        &self.key
    }

    pub fn height(&self) -> ChainEpoch {
        self.height
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.blocks
    }

    /// Timestamp of the tipset, taken from its first block.
    pub fn min_timestamp(&self) -> u64 {
        // `blocks` is non-empty by construction
        self.blocks.first().map(|b| b.timestamp).unwrap_or_default()
    }

    pub fn parents(&self) -> TipSetKey {
        self.blocks
            .first()
            .map(|b| TipSetKey(b.parents.clone()))
            .unwrap_or_default()
    }
}

/// Direction of a head change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadChangeType {
    Current,
    Apply,
    Revert,
}

/// One entry of a `ChainNotify` / `ChainGetPath` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeadChange {
    #[serde(rename = "Type")]
    pub change: HeadChangeType,
    #[serde(rename = "Val")]
    pub tipset: TipSet,
}

// =============================================================================
// CLUSTER B: ACCOUNTS
// =============================================================================

/// On-chain actor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Actor {
    pub code: Cid,
    pub head: Cid,
    pub nonce: u64,
    pub balance: BigInt,
}

/// Node version information returned by `Version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiVersion {
    pub version: String,
    pub api_version: u32,
    pub block_delay: u64,
}

/// Network version at a tipset.
pub type NetworkVersion = u32;


#[cfg(test)]
mod tests {
    use super::fixtures::block;
    use super::*;

    #[test]
    fn test_tipset_requires_blocks() {
        assert_eq!(TipSet::new(vec![]), Err(TipSetError::Empty));
    }

    #[test]
    fn test_tipset_rejects_mixed_heights() {
        let err = TipSet::new(vec![block("a", 10, 100), block("b", 11, 100)]).unwrap_err();
        assert_eq!(
            err,
            TipSetError::MismatchedHeight {
                first: 10,
                other: 11
            }
        );
    }

    #[test]
    fn test_tipset_key_and_timestamp() {
        let ts = TipSet::new(vec![block("a", 10, 100), block("b", 10, 105)]).unwrap();
        assert_eq!(ts.height(), 10);
        assert_eq!(ts.min_timestamp(), 100);
        assert_eq!(ts.key().to_string(), "{a,b}");
        assert_eq!(ts.parents(), TipSetKey(vec![Cid::from("bafyparent")]));
    }

    #[test]
    fn test_tipset_deserialize_rejects_empty() {
        let json = r#"{"Cids":[],"Blocks":[],"Height":5}"#;
        assert!(serde_json::from_str::<TipSet>(json).is_err());
    }

    #[test]
    fn test_tipset_serde_keeps_blocks() {
        let ts = TipSet::new(vec![block("a", 7, 70)]).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let back: TipSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_empty_key_means_head() {
        assert!(TipSetKey::EMPTY.is_empty());
        assert!(TipSetKey::default().is_empty());
        assert!(!TipSetKey::new(vec![Cid::from("a")]).is_empty());
    }
}
