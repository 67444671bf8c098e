//! Chain freshness validation.
//!
//! The gateway refuses requests that reference chain state older than the
//! configured lookback cap. Two checks exist:
//!
//! - a tipset is too old if its first block's timestamp is more than the cap
//!   in the past;
//! - a height is too old if the time at that height, projected backward from
//!   a reference tipset by `(tipset height - height) * block delay`, is.
//!
//! An empty [`TipSetKey`] means "current head" and is never re-validated by
//! [`FreshnessValidator::check_tipset_key`].

use shared_types::{BackendError, ChainEpoch, TipSet, TipSetKey};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::config::FreshnessConfig;
use crate::ports::outbound::{ChainResolver, TimeSource};

/// The lookback cap was exceeded.
///
/// Built once per validator and cloned for every rejection; the message
/// carries the configured cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleError {
    message: Arc<str>,
}

impl StaleError {
    pub fn new(lookback_cap: Duration) -> Self {
        let message = format!(
            "lookbacks of more than {} are disallowed",
            humantime::format_duration(lookback_cap)
        );
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StaleError {}

/// Freshness check failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreshnessError {
    /// The referenced tipset itself is too old
    #[error("bad tipset: {0}")]
    BadTipset(StaleError),

    /// The requested height projects to a time that is too old
    #[error("bad tipset height: {0}")]
    BadTipsetHeight(StaleError),

    /// The requested height lies after the reference tipset
    #[error("tipset height in future")]
    FutureHeight,

    /// The reference tipset could not be resolved
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Validates chain references against wall-clock staleness bounds.
pub struct FreshnessValidator {
    clock: Arc<dyn TimeSource>,
    lookback_cap: Duration,
    block_delay: Duration,
    stale: StaleError,
}

impl FreshnessValidator {
    pub fn new(config: &FreshnessConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            lookback_cap: config.lookback_cap,
            block_delay: config.block_delay,
            stale: StaleError::new(config.lookback_cap),
        }
    }

    pub fn lookback_cap(&self) -> Duration {
        self.lookback_cap
    }

    /// Validate a tipset key; the empty key is always accepted.
    pub async fn check_tipset_key<R>(&self, resolver: &R, tsk: &TipSetKey) -> Result<(), FreshnessError>
    where
        R: ChainResolver + ?Sized,
    {
        if tsk.is_empty() {
            return Ok(());
        }

        let ts = resolver.chain_get_tip_set(tsk).await?;
        self.check_tipset(&ts)
    }

    /// Validate a resolved tipset by its first block's timestamp.
    pub fn check_tipset(&self, ts: &TipSet) -> Result<(), FreshnessError> {
        let at_ms = i128::from(ts.min_timestamp()) * 1000;
        self.check_timestamp(at_ms)
            .map_err(FreshnessError::BadTipset)
    }

    /// Validate `height` relative to an already resolved tipset.
    pub fn check_tipset_height(&self, ts: &TipSet, height: ChainEpoch) -> Result<(), FreshnessError> {
        if height > ts.height() {
            return Err(FreshnessError::FutureHeight);
        }

        let delta_epochs = i128::from(ts.height()) - i128::from(height);
        let delta_ms = delta_epochs * self.block_delay.as_millis() as i128;
        let at_ms = i128::from(ts.min_timestamp()) * 1000 - delta_ms;

        self.check_timestamp(at_ms)
            .map_err(FreshnessError::BadTipsetHeight)
    }

    /// Resolve `tsk` (empty = head), validate the tipset, then `height`
    /// relative to it.
    pub async fn check_height_at<R>(
        &self,
        resolver: &R,
        height: ChainEpoch,
        tsk: &TipSetKey,
    ) -> Result<(), FreshnessError>
    where
        R: ChainResolver + ?Sized,
    {
        let ts = if tsk.is_empty() {
            resolver.chain_head().await?
        } else {
            resolver.chain_get_tip_set(tsk).await?
        };

        self.check_tipset(&ts)?;
        self.check_tipset_height(&ts, height)
    }

    fn check_timestamp(&self, at_ms: i128) -> Result<(), StaleError> {
        let now_ms = i128::from(self.clock.now()) * 1000;
        let age_ms = now_ms - at_ms;
        if age_ms > self.lookback_cap.as_millis() as i128 {
            debug!(age_ms = %age_ms, "Refusing stale chain reference");
            return Err(self.stale.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::ManualTimeSource;
    use crate::testing::{tipset_at, StaticChain};
    use proptest::prelude::*;

    const HOUR: u64 = 3600;
    const NOW: u64 = 1_700_000_000;

    fn validator() -> FreshnessValidator {
        let config = FreshnessConfig::default();
        FreshnessValidator::new(&config, Arc::new(ManualTimeSource::new(NOW)))
    }

    #[test]
    fn test_recent_tipset_is_fresh() {
        let v = validator();
        assert!(v.check_tipset(&tipset_at("a", 100, NOW - 23 * HOUR)).is_ok());
    }

    #[test]
    fn test_old_tipset_is_stale() {
        let v = validator();
        let err = v.check_tipset(&tipset_at("a", 100, NOW - 25 * HOUR)).unwrap_err();
        assert!(matches!(err, FreshnessError::BadTipset(_)));
        assert_eq!(
            err.to_string(),
            "bad tipset: lookbacks of more than 1day are disallowed"
        );
    }

    #[test]
    fn test_exactly_at_cap_is_fresh() {
        let v = validator();
        assert!(v.check_tipset(&tipset_at("a", 100, NOW - 24 * HOUR)).is_ok());
    }

    #[test]
    fn test_future_height() {
        let v = validator();
        let ts = tipset_at("a", 100, NOW);
        assert_eq!(v.check_tipset_height(&ts, 150), Err(FreshnessError::FutureHeight));
    }

    #[test]
    fn test_height_projection() {
        let v = validator();
        // 50 epochs * 30s = 25 minutes before the tipset
        let ts = tipset_at("a", 100, NOW - 23 * HOUR);
        assert!(v.check_tipset_height(&ts, 50).is_ok());

        let ts = tipset_at("a", 100, NOW - 24 * HOUR + 10 * 60);
        let err = v.check_tipset_height(&ts, 50).unwrap_err();
        assert!(matches!(err, FreshnessError::BadTipsetHeight(_)));
    }

    #[test]
    fn test_stale_error_is_shared() {
        let v = validator();
        let a = v.check_tipset(&tipset_at("a", 1, 0)).unwrap_err();
        let b = v.check_tipset(&tipset_at("b", 1, 0)).unwrap_err();
        match (a, b) {
            (FreshnessError::BadTipset(a), FreshnessError::BadTipset(b)) => {
                assert!(Arc::ptr_eq(&a.message, &b.message));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_key_skips_resolution() {
        let v = validator();
        let chain = StaticChain::failing();
        assert!(v.check_tipset_key(&chain, &TipSetKey::EMPTY).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolution_error_passes_through() {
        let v = validator();
        let chain = StaticChain::failing();
        let tsk = TipSetKey::new(vec!["bafy".into()]);
        let err = v.check_tipset_key(&chain, &tsk).await.unwrap_err();
        assert_eq!(
            err,
            FreshnessError::Backend(BackendError::new(-32000, "blockstore: not found"))
        );
    }

    #[tokio::test]
    async fn test_height_check_uses_head_for_empty_key() {
        let v = validator();
        let chain = StaticChain::with_head(tipset_at("head", 1000, NOW));
        assert!(v.check_height_at(&chain, 990, &TipSetKey::EMPTY).await.is_ok());
        assert_eq!(
            v.check_height_at(&chain, 1001, &TipSetKey::EMPTY).await,
            Err(FreshnessError::FutureHeight)
        );
        // 3000 epochs * 30s = 25h
        assert!(matches!(
            v.check_height_at(&chain, -2000, &TipSetKey::EMPTY).await,
            Err(FreshnessError::BadTipsetHeight(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_height_check_matches_projection(
            age in 0u64..(48 * HOUR),
            back in 0i64..5000,
        ) {
            let v = validator();
            let ts = tipset_at("a", 10_000, NOW - age);
            let projected_age = age + back as u64 * 30;
            let result = v.check_tipset_height(&ts, 10_000 - back);
            prop_assert_eq!(result.is_ok(), projected_age <= 24 * HOUR);
        }
    }
}
