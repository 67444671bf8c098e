//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use shared_types::ChainEpoch;
use std::time::Duration;

use crate::domain::methods::OperationClass;

/// Default maximum age of a chain reference the gateway will serve.
pub const DEFAULT_LOOKBACK_CAP: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bound on how far back message search/wait may look.
pub const DEFAULT_STATE_WAIT_LOOKBACK_LIMIT: ChainEpoch = 20;

/// Default budget for acquiring admission tokens.
pub const DEFAULT_RATE_LIMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default epoch duration.
pub const DEFAULT_BLOCK_DELAY: Duration = Duration::from_secs(30);

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Chain freshness bounds
    pub freshness: FreshnessConfig,
    /// Admission control
    pub rate_limit: RateLimitConfig,
    /// Token verification service
    pub auth: AuthConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.freshness.lookback_cap.is_zero() {
            return Err(ConfigError::InvalidFreshness(
                "lookback_cap cannot be 0".into(),
            ));
        }

        if self.freshness.block_delay.is_zero() {
            return Err(ConfigError::InvalidFreshness(
                "block_delay cannot be 0".into(),
            ));
        }

        if self.freshness.state_wait_lookback_limit < shared_types::LOOKBACK_NO_LIMIT {
            return Err(ConfigError::InvalidFreshness(format!(
                "state_wait_lookback_limit must be >= {}",
                shared_types::LOOKBACK_NO_LIMIT
            )));
        }

        if self.rate_limit.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "rate limit timeout cannot be 0".into(),
            ));
        }

        // Every operation class must fit in a single bucket, otherwise the
        // most expensive calls could never be admitted.
        let max_cost = OperationClass::max_cost();
        if self.rate_limit.burst < max_cost {
            return Err(ConfigError::InvalidRateLimit(format!(
                "burst {} is smaller than the largest operation cost {}",
                self.rate_limit.burst, max_cost
            )));
        }

        if self.auth.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "auth timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Chain freshness bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Requests referencing chain state older than this are refused
    #[serde(with = "humantime_serde")]
    pub lookback_cap: Duration,
    /// Wall-clock duration of one epoch
    #[serde(with = "humantime_serde")]
    pub block_delay: Duration,
    /// Upper bound for the lookback of StateSearchMsg/StateWaitMsg
    /// (`-1` disables the clamp)
    pub state_wait_lookback_limit: ChainEpoch,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            lookback_cap: DEFAULT_LOOKBACK_CAP,
            block_delay: DEFAULT_BLOCK_DELAY,
            state_wait_lookback_limit: DEFAULT_STATE_WAIT_LOOKBACK_LIMIT,
        }
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Process-wide refill rate in tokens per second (0 = unlimited)
    pub tokens_per_second: u32,
    /// Per-connection refill rate in tokens per second (0 = no per-connection bucket)
    pub per_connection_tokens_per_second: u32,
    /// Bucket capacity
    pub burst: u32,
    /// How long a call may wait for tokens before it is refused
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_second: 0,
            per_connection_tokens_per_second: 0,
            burst: OperationClass::max_cost(),
            timeout: DEFAULT_RATE_LIMIT_TIMEOUT,
        }
    }
}

/// Token verification service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the verification service (None = tokens are not accepted)
    pub url: Option<String>,
    /// Name this gateway reports to the verification service
    pub service_name: String,
    /// Verification request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_name: "chain-gateway".to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid freshness bound
    #[error("invalid freshness bound: {0}")]
    InvalidFreshness(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
