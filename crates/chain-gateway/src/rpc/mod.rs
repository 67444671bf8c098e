//! The gateway node: one async method per exposed operation.
//!
//! Every call goes through the same pipeline:
//!
//! 1. look the method up in the registry (unsupported methods stop here,
//!    without touching the limiter);
//! 2. withdraw the method's class cost from the admission buckets;
//! 3. validate every tipset/height parameter against the lookback cap;
//! 4. forward to the backend and return its answer unchanged.
//!
//! Steps 2 to 4 race the caller's cancellation token.

pub mod chain;
pub mod discover;
pub mod eth;
pub mod state;
pub mod wallet;

pub use discover::discover_document;

use shared_types::{ChainEpoch, TipSetKey, LOOKBACK_NO_LIMIT};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::Secp256k1Verifier;
use crate::domain::config::GatewayConfig;
use crate::domain::context::CallContext;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::freshness::{FreshnessError, FreshnessValidator};
use crate::domain::methods::get_method_info;
use crate::middleware::metrics::{GatewayMetrics, RequestTimer};
use crate::middleware::rate_limit::AdmissionController;
use crate::ports::outbound::{SignatureVerifier, SystemTimeSource, TargetApi, TimeSource};

/// Trust-bounded facade over a [`TargetApi`].
///
/// Holds no per-call state; share it behind an `Arc` across connections.
pub struct GatewayNode {
    target: Arc<dyn TargetApi>,
    admission: AdmissionController,
    freshness: FreshnessValidator,
    verifier: Arc<dyn SignatureVerifier>,
    metrics: Arc<GatewayMetrics>,
    state_wait_lookback_limit: ChainEpoch,
}

impl GatewayNode {
    pub fn new(
        config: &GatewayConfig,
        target: Arc<dyn TargetApi>,
        clock: Arc<dyn TimeSource>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let metrics = Arc::new(GatewayMetrics::new());
        Self {
            target,
            admission: AdmissionController::new(&config.rate_limit, Arc::clone(&metrics)),
            freshness: FreshnessValidator::new(&config.freshness, clock),
            verifier,
            metrics,
            state_wait_lookback_limit: config.freshness.state_wait_lookback_limit,
        }
    }

    /// Node using the system clock and local secp256k1 verification.
    pub fn with_config(config: &GatewayConfig, target: Arc<dyn TargetApi>) -> Self {
        Self::new(
            config,
            target,
            Arc::new(SystemTimeSource),
            Arc::new(Secp256k1Verifier::new()),
        )
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Context for a call arriving on a new connection; carries that
    /// connection's bucket when per-connection limits are enabled.
    ///
    /// Reuse the returned context (or clones of it) for every call on the
    /// same connection.
    pub fn connection_context(&self, cancel: CancellationToken) -> CallContext {
        CallContext::with_cancel(cancel).with_connection_bucket(self.admission.connection_bucket())
    }

    /// Run one call of `method` through admission and cancellation.
    async fn call<T, Fut>(&self, ctx: &CallContext, method: &'static str, body: Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let result = self.admit_and_run(ctx, method, body).await;

        if let Err(e) = &result {
            debug!(method, error = %e, "Call refused or failed");
        }
        timer.finish(result.as_ref().err());
        result
    }

    async fn admit_and_run<T, Fut>(&self, ctx: &CallContext, method: &'static str, body: Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        let info = get_method_info(method)
            .filter(|info| info.supported)
            .ok_or(GatewayError::Unsupported)?;

        let work = async {
            self.admission.acquire(ctx, info.tokens()).await?;
            body.await
        };

        tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => Err(GatewayError::Cancelled),
            res = work => res,
        }
    }

    /// Reject stale tipset keys; the empty key passes.
    async fn check_tipset_key(&self, tsk: &TipSetKey) -> Result<(), FreshnessError> {
        self.freshness.check_tipset_key(&*self.target, tsk).await
    }

    /// Reject heights that are in the future or too far back from `tsk`.
    async fn check_tipset_height(&self, height: ChainEpoch, tsk: &TipSetKey) -> Result<(), FreshnessError> {
        self.freshness
            .check_height_at(&*self.target, height, tsk)
            .await
    }

    /// Cap a message search lookback at the configured limit.
    pub fn clamp_lookback(&self, limit: ChainEpoch) -> ChainEpoch {
        clamp_lookback(limit, self.state_wait_lookback_limit)
    }
}

/// `LOOKBACK_NO_LIMIT` becomes the configured limit; anything above a
/// configured limit is cut down to it. A configured limit of
/// `LOOKBACK_NO_LIMIT` leaves explicit limits alone.
pub fn clamp_lookback(limit: ChainEpoch, configured: ChainEpoch) -> ChainEpoch {
    let limit = if limit == LOOKBACK_NO_LIMIT {
        configured
    } else {
        limit
    };
    if configured != LOOKBACK_NO_LIMIT && limit > configured {
        configured
    } else {
        limit
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::config::{FreshnessConfig, RateLimitConfig};
    use crate::ports::outbound::ManualTimeSource;
    use crate::testing::{tipset_at, MockTarget};
    use std::time::Duration;

    pub const NOW: u64 = 1_700_000_000;
    pub const HOUR: u64 = 3600;
    pub const HEAD_HEIGHT: ChainEpoch = 10_000;

    pub struct Harness {
        pub node: GatewayNode,
        pub target: Arc<MockTarget>,
        pub clock: Arc<ManualTimeSource>,
    }

    pub fn harness() -> Harness {
        harness_with(GatewayConfig::default())
    }

    pub fn limited_harness(tokens_per_second: u32) -> Harness {
        harness_with(GatewayConfig {
            rate_limit: RateLimitConfig {
                tokens_per_second,
                timeout: Duration::from_millis(50),
                ..RateLimitConfig::default()
            },
            freshness: FreshnessConfig::default(),
            ..GatewayConfig::default()
        })
    }

    pub fn harness_with(config: GatewayConfig) -> Harness {
        let target = Arc::new(MockTarget::new(tipset_at("bafyhead", HEAD_HEIGHT, NOW)));
        let clock = Arc::new(ManualTimeSource::new(NOW));
        let node = GatewayNode::new(
            &config,
            Arc::clone(&target) as Arc<dyn TargetApi>,
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            Arc::new(Secp256k1Verifier::new()),
        );
        Harness { node, target, clock }
    }

    /// A tipset `age` seconds old, registered with the mock.
    pub fn old_tipset(h: &Harness, cid: &str, age: u64) -> TipSetKey {
        let ts = tipset_at(cid, HEAD_HEIGHT - (age / 30) as ChainEpoch, NOW - age);
        let key = ts.key().clone();
        h.target.add_tipset(ts);
        key
    }
}
