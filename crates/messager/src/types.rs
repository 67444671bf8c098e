//! Message service data types.

use serde::{Deserialize, Serialize};
use shared_types::{BigInt, ChainEpoch, Cid, Message, MessageReceipt, Signature, TipSetKey};
use std::time::Duration;

/// Lifecycle of a message tracked by the message service.
///
/// Encoded on the wire as its ordinal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageState {
    #[default]
    Unknown = 0,
    /// Accepted, not yet signed or assigned a nonce.
    PendingOffChain = 1,
    /// Signed and broadcast, waiting for inclusion.
    PendingOnChain = 2,
    Final = 3,
    Failed = 4,
    /// Replaced by another message that landed instead.
    Superseded = 5,
}

impl MessageState {
    /// States in which observed confidence decides success.
    pub fn counts_confidence(self) -> bool {
        matches!(
            self,
            MessageState::PendingOnChain | MessageState::Final | MessageState::Superseded
        )
    }
}

impl From<MessageState> for u8 {
    fn from(state: MessageState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for MessageState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MessageState::Unknown,
            1 => MessageState::PendingOffChain,
            2 => MessageState::PendingOnChain,
            3 => MessageState::Final,
            4 => MessageState::Failed,
            5 => MessageState::Superseded,
            other => return Err(format!("invalid message state {other}")),
        })
    }
}

/// Sending options attached to a pushed message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgMeta {
    pub expire_epoch: ChainEpoch,
    /// Multiplier applied to the estimated gas limit.
    pub gas_over_estimation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee: Option<BigInt>,
    pub max_fee_cap: BigInt,
}

/// The service's full view of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsgDetail {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub unsigned_cid: Option<Cid>,
    #[serde(default)]
    pub signed_cid: Option<Cid>,
    pub message: Message,
    #[serde(default)]
    pub signature: Option<Signature>,
    #[serde(default)]
    pub height: ChainEpoch,
    #[serde(default)]
    pub confidence: i64,
    #[serde(default)]
    pub receipt: Option<MessageReceipt>,
    #[serde(default)]
    pub tip_set_key: TipSetKey,
    #[serde(default)]
    pub meta: Option<MsgMeta>,
    #[serde(default)]
    pub wallet_name: String,
    pub state: MessageState,
}

impl MsgDetail {
    /// The CID the chain knows this message by.
    ///
    /// BLS messages are included unsigned; everything else by its signed
    /// form.
    pub fn cid(&self) -> Option<&Cid> {
        self.unsigned_cid.as_ref()?;
        if is_bls(self.message.from.as_str()) {
            self.unsigned_cid.as_ref()
        } else {
            self.signed_cid.as_ref()
        }
    }

    /// Failure text recorded in the receipt, empty when there is none.
    pub fn failure_reason(&self) -> String {
        self.receipt
            .as_ref()
            .map(|r| String::from_utf8_lossy(&r.return_data).into_owned())
            .unwrap_or_default()
    }
}

fn is_bls(addr: &str) -> bool {
    addr.len() > 2 && (addr.starts_with("f3") || addr.starts_with("t3"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagerConfig {
    pub url: String,
    pub token: String,
    /// Delay between status fetches while waiting on a message.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Per-request timeout of the RPC client.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long a settled outcome answers repeated waits.
    #[serde(with = "humantime_serde")]
    pub settled_ttl: Duration,
    /// Most settled outcomes remembered at once; the oldest go first.
    pub settled_capacity: usize,
}

impl Default for MessagerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            settled_ttl: Duration::from_secs(10 * 60),
            settled_capacity: 1024,
        }
    }
}

impl MessagerConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }
}
