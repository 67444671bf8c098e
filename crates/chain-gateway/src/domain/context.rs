//! Per-call context.
//!
//! Carries what the transport knows about a call into the gateway: the
//! caller's cancellation signal and, when per-connection limits are enabled,
//! the connection's own token bucket.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::middleware::rate_limit::TokenBucket;

/// Context of one gateway call
#[derive(Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    connection_bucket: Option<Arc<TokenBucket>>,
}

impl CallContext {
    /// Context with its own cancellation token and no connection bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context cancelled together with `cancel`.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            connection_bucket: None,
        }
    }

    /// Attach the caller connection's bucket.
    pub fn with_connection_bucket(mut self, bucket: Option<Arc<TokenBucket>>) -> Self {
        self.connection_bucket = bucket;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn connection_bucket(&self) -> Option<&Arc<TokenBucket>> {
        self.connection_bucket.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("connection_limited", &self.connection_bucket.is_some())
            .finish()
    }
}
