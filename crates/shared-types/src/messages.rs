//! # Message Types
//!
//! Messages as they travel through the message pool, plus their on-chain
//! receipts and lookups.

use crate::entities::{Address, BigInt, ChainEpoch, Cid, TipSetKey};
use serde::{Deserialize, Serialize};

/// An unsigned chain message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    pub nonce: u64,
    pub value: BigInt,
    pub gas_limit: i64,
    pub gas_fee_cap: BigInt,
    pub gas_premium: BigInt,
    pub method: u64,
    #[serde(default)]
    pub params: Vec<u8>,
}

/// Signature scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigType {
    Secp256k1,
    Bls,
    Delegated,
}

/// A signature together with its scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Signature {
    #[serde(rename = "Type")]
    pub sig_type: SigType,
    pub data: Vec<u8>,
}

/// A message with its sender signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedMessage {
    pub message: Message,
    pub signature: Signature,
}

/// Execution receipt of an on-chain message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageReceipt {
    pub exit_code: i64,
    /// Raw return bytes; on failure this carries the reason text.
    #[serde(rename = "Return", default)]
    pub return_data: Vec<u8>,
    pub gas_used: i64,
}

/// Where and how a message landed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsgLookup {
    pub message: Cid,
    pub receipt: MessageReceipt,
    pub tip_set: TipSetKey,
    pub height: ChainEpoch,
}

/// Messages contained in one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockMessages {
    pub bls_messages: Vec<Message>,
    pub secpk_messages: Vec<SignedMessage>,
    pub cids: Vec<Cid>,
}

/// A message paired with its CID, as returned by `ChainGetParentMessages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParentMessage {
    pub cid: Cid,
    pub message: Message,
}

/// Spec passed alongside messages to gas estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageSendSpec {
    pub max_fee: BigInt,
}
