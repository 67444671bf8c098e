//! # Error Types
//!
//! Errors reported by the trusted backend node. The gateway passes these
//! through to callers unchanged, so they keep the node's code and message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-RPC code used when the backend did not supply one.
pub const BACKEND_INTERNAL_ERROR: i32 = -32603;

/// An error returned by the backend node.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct BackendError {
    /// Error code reported by the node.
    pub code: i32,
    /// Human-readable message reported by the node.
    pub message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Backend failure without a node-supplied code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BACKEND_INTERNAL_ERROR, message)
    }
}

/// Result of a backend call.
pub type BackendResult<T> = Result<T, BackendError>;
