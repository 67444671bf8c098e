//! Error types for the proof event crate.

use shared_types::Address;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::events::DecodeError;

/// Failure talking to a proof hub.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("listen proof event failed: {0}")]
    Subscribe(String),
    #[error("response proof event failed: {0}")]
    Response(String),
    #[error("no pending request with id {0}")]
    UnknownRequest(Uuid),
}

/// Why one listening session ended. Never escapes the listener loop.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("listen proof event call failed: {0}")]
    Subscribe(#[source] ClientError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure reported by a [`crate::WinningPoStProver`].
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProverError {
    pub message: String,
}

impl ProverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a request issued through the in-process hub.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("miner {0} is not connected")]
    NotConnected(Address),
    #[error("miner {0} disconnected before the request was delivered")]
    Disconnected(Address),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("request abandoned before a response arrived")]
    Abandoned,
    #[error("remote error: {0}")]
    Remote(String),
    #[error("encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),
}
