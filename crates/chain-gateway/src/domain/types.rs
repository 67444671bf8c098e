//! Backend payload types that only appear on the gateway surface.
//!
//! Large node structures the gateway never inspects (miner info, deadlines,
//! deal records, IPLD nodes) stay opaque JSON values; they are forwarded
//! verbatim.

use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use shared_types::{Address, BigInt, Cid, Message, MessageSendSpec};
use std::fmt;
use std::str::FromStr;

pub type IpldObject = serde_json::Value;
pub type MinerInfo = serde_json::Value;
pub type MinerPower = serde_json::Value;
pub type Deadline = serde_json::Value;
pub type DeadlineInfo = serde_json::Value;
pub type MarketDeal = serde_json::Value;
pub type SectorOnChainInfo = serde_json::Value;
pub type MsigVesting = serde_json::Value;
pub type MsigTransaction = serde_json::Value;
pub type CirculatingSupply = serde_json::Value;
pub type BitField = Vec<u64>;

/// Collateral bounds for a storage deal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealCollateralBounds {
    pub min: BigInt,
    pub max: BigInt,
}

/// Market escrow state of an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketBalance {
    pub escrow: BigInt,
    pub locked: BigInt,
}

/// Decoded actor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActorState {
    pub balance: BigInt,
    pub code: Cid,
    pub state: serde_json::Value,
}

/// One entry of a batch gas estimation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimateMessage {
    pub msg: Message,
    pub spec: Option<MessageSendSpec>,
}

/// One entry of a batch gas estimation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimateResult {
    pub msg: Option<Message>,
    #[serde(default)]
    pub err: String,
}

/// Verified client allowance
pub type StoragePower = BigInt;

/// Address to check a signature against
pub type SignerAddress = Address;

/// Ethereum-style block selector: a tag, a number, or a block hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EthBlockParam {
    Latest,
    Pending,
    Safe,
    Finalized,
    Earliest,
    Number(u64),
    Hash(H256),
}

/// Unparseable block selector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid block parameter: {0}")]
pub struct InvalidBlockParam(pub String);

impl FromStr for EthBlockParam {
    type Err = InvalidBlockParam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => return Ok(EthBlockParam::Latest),
            "pending" => return Ok(EthBlockParam::Pending),
            "safe" => return Ok(EthBlockParam::Safe),
            "finalized" => return Ok(EthBlockParam::Finalized),
            "earliest" => return Ok(EthBlockParam::Earliest),
            _ => {}
        }

        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| InvalidBlockParam(s.to_string()))?;

        if digits.len() == 64 {
            let bytes = hex::decode(digits).map_err(|_| InvalidBlockParam(s.to_string()))?;
            return Ok(EthBlockParam::Hash(H256::from_slice(&bytes)));
        }

        u64::from_str_radix(digits, 16)
            .map(EthBlockParam::Number)
            .map_err(|_| InvalidBlockParam(s.to_string()))
    }
}

impl TryFrom<String> for EthBlockParam {
    type Error = InvalidBlockParam;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for EthBlockParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EthBlockParam::Latest => f.write_str("latest"),
            EthBlockParam::Pending => f.write_str("pending"),
            EthBlockParam::Safe => f.write_str("safe"),
            EthBlockParam::Finalized => f.write_str("finalized"),
            EthBlockParam::Earliest => f.write_str("earliest"),
            EthBlockParam::Number(n) => write!(f, "{n:#x}"),
            EthBlockParam::Hash(h) => write!(f, "0x{}", hex::encode(h.as_bytes())),
        }
    }
}

impl From<EthBlockParam> for String {
    fn from(value: EthBlockParam) -> Self {
        value.to_string()
    }
}
