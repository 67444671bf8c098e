//! Wire shapes exchanged with the proof hub.
//!
//! Field names follow the hub's JSON (`Id`, `Method`, `Payload`, ...).
//! Payloads are opaque bytes on the channel and are decoded exactly once,
//! by [`ProofEvent::decode`].

use serde::{Deserialize, Serialize};
use shared_types::{Address, Cid};
use thiserror::Error;
use uuid::Uuid;

/// Method tag of the event sent right after a subscription is accepted.
pub const INIT_CONNECT: &str = "InitConnect";
/// Method tag of a winning PoSt request.
pub const COMPUTE_PROOF: &str = "ComputeProof";

/// An event pushed by the hub to a listening miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEvent {
    pub id: Uuid,
    pub method: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl RequestEvent {
    /// Build an event with a fresh id.
    pub fn new(method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            payload,
        }
    }
}

/// The miner's answer to a [`RequestEvent`], correlated by `id`.
///
/// Exactly one of `payload` and `error` is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEvent {
    pub id: Uuid,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub error: String,
}

impl ResponseEvent {
    pub fn success(id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            error: String::new(),
        }
    }

    pub fn failure(id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id,
            payload: Vec::new(),
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Filter a miner registers with when it subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProofRegisterPolicy {
    pub miner_address: Address,
}

/// Payload of [`INIT_CONNECT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectedCompleted {
    pub channel_id: Uuid,
}

/// A sector the proof must cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorInfo {
    pub seal_proof: i64,
    pub sector_number: u64,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: Cid,
}

/// Payload of [`COMPUTE_PROOF`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputeProofRequest {
    pub sector_infos: Vec<SectorInfo>,
    pub rand: Vec<u8>,
}

/// One proof produced by the prover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PoStProof {
    #[serde(rename = "PoStProof")]
    pub post_proof: i64,
    pub proof_bytes: Vec<u8>,
}

/// A [`RequestEvent`] after its payload has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofEvent {
    InitConnect(ConnectedCompleted),
    ComputeProof(ComputeProofRequest),
    /// Unrecognised method tag; carries the tag for logging.
    Unknown(String),
}

/// A known method whose payload did not decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("odd error in connect: {0}")]
    InitConnect(#[source] serde_json::Error),
    #[error("malformed compute proof request: {0}")]
    ComputeProof(#[source] serde_json::Error),
}

impl ProofEvent {
    pub fn decode(event: &RequestEvent) -> Result<Self, DecodeError> {
        match event.method.as_str() {
            INIT_CONNECT => serde_json::from_slice(&event.payload)
                .map(ProofEvent::InitConnect)
                .map_err(DecodeError::InitConnect),
            COMPUTE_PROOF => serde_json::from_slice(&event.payload)
                .map(ProofEvent::ComputeProof)
                .map_err(DecodeError::ComputeProof),
            other => Ok(ProofEvent::Unknown(other.to_string())),
        }
    }
}
