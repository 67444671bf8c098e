//! Gateway error types with JSON-RPC 2.0 error codes.
//!
//! [`GatewayError`] is what every gateway operation returns. Errors the
//! gateway produces itself (admission, staleness, unsupported) carry stable
//! messages; backend errors are passed through untouched. [`ApiError`] is the
//! caller-visible JSON-RPC shape.

use serde::{Deserialize, Serialize};
use shared_types::BackendError;

use crate::domain::freshness::FreshnessError;
use crate::middleware::rate_limit::AdmissionError;

/// JSON-RPC error codes the gateway emits on its own behalf
pub mod codes {
    pub const INVALID_PARAMS: i32 = -32602;

    // Implementation-defined server range
    pub const METHOD_NOT_SUPPORTED: i32 = -32004;
    pub const TIMEOUT: i32 = -32006;
    pub const UNAUTHORIZED: i32 = -32010;
    pub const RATE_LIMITED: i32 = -32029;
}

/// JSON-RPC error object as the caller sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, details)
    }

    /// Missing or rejected token, or a permission the caller does not hold
    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new(
            codes::UNAUTHORIZED,
            format!("unauthorized: {}", details.into()),
        )
    }
}

/// Result type for the JSON-RPC surface
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by gateway operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Admission control refused the call
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// A chain reference failed the freshness checks
    #[error(transparent)]
    Freshness(#[from] FreshnessError),

    /// One endpoint of a range query failed the freshness checks
    #[error("gateway: checking '{endpoint}' tipset: {source}")]
    PathEndpoint {
        endpoint: &'static str,
        #[source]
        source: FreshnessError,
    },

    /// The operation would mutate node-local state
    #[error("not supported")]
    Unsupported,

    /// The caller went away while the backend call was in flight
    #[error("request cancelled")]
    Cancelled,

    /// Backend failure, passed through unchanged
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<FreshnessError> for ApiError {
    fn from(err: FreshnessError) -> Self {
        match err {
            FreshnessError::Backend(backend) => backend.into(),
            other => ApiError::invalid_params(other.to_string()),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::new(err.code, err.message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Admission(e) => ApiError::new(codes::RATE_LIMITED, e.to_string()),
            GatewayError::Freshness(e) => e.into(),
            GatewayError::PathEndpoint { ref source, .. } => {
                let code = match source {
                    FreshnessError::Backend(backend) => backend.code,
                    _ => codes::INVALID_PARAMS,
                };
                ApiError::new(code, err.to_string())
            }
            GatewayError::Unsupported => {
                ApiError::new(codes::METHOD_NOT_SUPPORTED, err.to_string())
            }
            GatewayError::Cancelled => ApiError::new(codes::TIMEOUT, err.to_string()),
            GatewayError::Backend(e) => e.into(),
        }
    }
}
