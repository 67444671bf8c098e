//! Admission control using the token bucket algorithm.
//!
//! Every gateway call withdraws its class cost from up to two buckets: the
//! caller's per-connection bucket (if the connection has one) and the
//! process-wide bucket. Both waits share one deadline derived from the
//! configured rate limit timeout, independent of any caller deadline.
//! Tokens taken from the connection bucket are not refunded when the
//! process-wide bucket then refuses.

use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    InsufficientCapacity, Quota, RateLimiter,
};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::config::RateLimitConfig;
use crate::domain::context::CallContext;
use crate::middleware::metrics::GatewayMetrics;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Why a bucket could not supply tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitFailure {
    /// The tokens would not be available before the deadline
    DeadlineExceeded,
    /// More tokens were requested than the bucket can ever hold
    ExceedsBurst { requested: u32, burst: u32 },
    /// The caller cancelled while waiting
    Cancelled,
}

impl fmt::Display for LimitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitFailure::DeadlineExceeded => f.write_str("context deadline exceeded"),
            LimitFailure::ExceedsBurst { requested, burst } => write!(
                f,
                "rate: Wait(n={requested}) exceeds limiter's burst {burst}"
            ),
            LimitFailure::Cancelled => f.write_str("context canceled"),
        }
    }
}

/// Admission refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The caller's connection bucket could not supply the tokens
    #[error("connection limited. {0}")]
    ConnectionLimited(LimitFailure),

    /// The process-wide bucket could not supply the tokens in time
    #[error("server busy. {0}")]
    ServerBusy(LimitFailure),
}

impl AdmissionError {
    /// Whether the refusal came from the caller cancelling.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AdmissionError::ConnectionLimited(LimitFailure::Cancelled)
                | AdmissionError::ServerBusy(LimitFailure::Cancelled)
        )
    }
}

/// A single token bucket; a zero refill rate means unlimited.
pub struct TokenBucket {
    limiter: Option<DirectLimiter>,
    burst: u32,
}

impl TokenBucket {
    /// Bucket refilling at `tokens_per_second` with capacity `burst`.
    pub fn new(tokens_per_second: u32, burst: u32) -> Self {
        let Some(rate) = NonZeroU32::new(tokens_per_second) else {
            return Self::unlimited();
        };
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: Some(RateLimiter::direct(quota)),
            burst: burst.get(),
        }
    }

    /// Bucket that never refuses.
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            burst: u32::MAX,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limiter.is_none()
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Withdraw `n` tokens, waiting at most until `deadline`.
    ///
    /// Fails immediately when the tokens cannot become available before the
    /// deadline, or when `n` exceeds the bucket capacity.
    pub async fn wait(
        &self,
        n: NonZeroU32,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), LimitFailure> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        let exceeds_burst = || LimitFailure::ExceedsBurst {
            requested: n.get(),
            burst: self.burst,
        };

        if cancel.is_cancelled() {
            return Err(LimitFailure::Cancelled);
        }

        match limiter.check_n(n) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(not_until)) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                if Instant::now() + wait > deadline {
                    return Err(LimitFailure::DeadlineExceeded);
                }
            }
            Err(InsufficientCapacity(_)) => return Err(exceeds_burst()),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LimitFailure::Cancelled),
            res = tokio::time::timeout_at(deadline, limiter.until_n_ready(n)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(InsufficientCapacity(_))) => Err(exceeds_burst()),
                Err(_) => Err(LimitFailure::DeadlineExceeded),
            },
        }
    }
}

/// Composes per-connection and process-wide buckets.
pub struct AdmissionController {
    global: TokenBucket,
    per_connection_rate: u32,
    burst: u32,
    timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl AdmissionController {
    pub fn new(config: &RateLimitConfig, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            global: TokenBucket::new(config.tokens_per_second, config.burst),
            per_connection_rate: config.per_connection_tokens_per_second,
            burst: config.burst,
            timeout: config.timeout,
            metrics,
        }
    }

    /// A fresh bucket for a new connection, if per-connection limits are on.
    pub fn connection_bucket(&self) -> Option<Arc<TokenBucket>> {
        if self.per_connection_rate == 0 {
            return None;
        }
        Some(Arc::new(TokenBucket::new(self.per_connection_rate, self.burst)))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Withdraw `tokens` from the caller's connection bucket and then from
    /// the process-wide bucket. A cost of zero is always admitted.
    pub async fn acquire(&self, ctx: &CallContext, tokens: u32) -> Result<(), AdmissionError> {
        let Some(n) = NonZeroU32::new(tokens) else {
            return Ok(());
        };
        let deadline = Instant::now() + self.timeout;
        let cancel = ctx.cancel_token();

        if let Some(bucket) = ctx.connection_bucket() {
            if let Err(failure) = bucket.wait(n, deadline, cancel).await {
                if failure != LimitFailure::Cancelled {
                    self.metrics.record_connection_limited();
                    warn!(tokens, reason = %failure, "Connection rate limit exceeded");
                }
                return Err(AdmissionError::ConnectionLimited(failure));
            }
        }

        if let Err(failure) = self.global.wait(n, deadline, cancel).await {
            if failure != LimitFailure::Cancelled {
                self.metrics.record_rate_limit_rejection();
                warn!(tokens, reason = %failure, "Server rate limit exceeded");
            }
            return Err(AdmissionError::ServerBusy(failure));
        }

        debug!(tokens, "Admitted");
        Ok(())
    }
}
