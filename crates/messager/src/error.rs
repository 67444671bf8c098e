//! Messager error types.

use thiserror::Error;

/// Failure reaching or talking to the message service.
#[derive(Debug, Clone, Error)]
pub enum MessagerError {
    #[error("invalid messager config: {0}")]
    Config(String),
    #[error("messager transport: {0}")]
    Transport(String),
    #[error("messager rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode messager response: {0}")]
    Decode(String),
}

/// Why `wait_message` returned without a settled message.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    #[error("msg failed due to {reason}")]
    Failed { reason: String },
    #[error("exit by client")]
    Cancelled,
    #[error(transparent)]
    Fetch(#[from] MessagerError),
}
