//! Gateway counters.
//!
//! Plain atomics; exported as JSON always and in Prometheus text format when
//! the `metrics` feature is enabled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::error::GatewayError;

/// Call and refusal counters for one gateway node
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Call outcomes
    pub calls: AtomicU64,
    pub calls_ok: AtomicU64,
    pub calls_failed: AtomicU64,

    // Admission counters ("server busy" vs "connection limited")
    pub rate_limit_rejected: AtomicU64,
    pub connection_limited: AtomicU64,

    // Gateway-side refusals
    pub stale_rejected: AtomicU64,
    pub unsupported_rejected: AtomicU64,
    pub cancelled: AtomicU64,

    // Backend failures passed through
    pub backend_errors: AtomicU64,

    // Summed call time; no histogram
    pub latency_micros: AtomicU64,
    pub latency_samples: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finished call and the refusal class of its error, if any.
    pub fn record_call(&self, error: Option<&GatewayError>, elapsed: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);

        match error {
            None => {
                self.calls_ok.fetch_add(1, Ordering::Relaxed);
            }
            Some(err) => {
                self.calls_failed.fetch_add(1, Ordering::Relaxed);
                let counter = match err {
                    GatewayError::Freshness(_) | GatewayError::PathEndpoint { .. } => {
                        Some(&self.stale_rejected)
                    }
                    GatewayError::Unsupported => Some(&self.unsupported_rejected),
                    GatewayError::Cancelled => Some(&self.cancelled),
                    GatewayError::Backend(_) => Some(&self.backend_errors),
                    // admission counters are bumped by the controller itself
                    GatewayError::Admission(_) => None,
                };
                if let Some(counter) = counter {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// A process-wide bucket refused ("server busy")
    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a per-connection bucket refusal
    pub fn record_connection_limited(&self) {
        self.connection_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean call time over every recorded call.
    pub fn mean_latency(&self) -> Duration {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency_micros.load(Ordering::Relaxed) / samples)
    }

    fn counters(&self) -> [(&'static str, &'static str, u64); 9] {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        [
            ("gateway_calls_total", "Calls seen by the gateway", load(&self.calls)),
            ("gateway_calls_ok_total", "Calls answered successfully", load(&self.calls_ok)),
            ("gateway_calls_failed_total", "Calls answered with an error", load(&self.calls_failed)),
            ("gateway_rate_limit_rejected_total", "Calls refused by the process-wide bucket", load(&self.rate_limit_rejected)),
            ("gateway_connection_limited_total", "Calls refused by a connection bucket", load(&self.connection_limited)),
            ("gateway_stale_rejected_total", "Calls refused for stale chain references", load(&self.stale_rejected)),
            ("gateway_unsupported_total", "Calls to unsupported operations", load(&self.unsupported_rejected)),
            ("gateway_cancelled_total", "Calls abandoned by the caller", load(&self.cancelled)),
            ("gateway_backend_errors_total", "Backend failures passed through", load(&self.backend_errors)),
        ]
    }

    /// Export metrics in Prometheus text format
    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

        let registry = Registry::new();
        for (name, help, value) in self.counters() {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }

        let latency = Gauge::new("gateway_mean_latency_seconds", "Mean call time")?;
        latency.set(self.mean_latency().as_secs_f64());
        registry.register(Box::new(latency))?;

        let mut text = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut text)?;
        String::from_utf8(text).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Counter snapshot as JSON, for a status endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<_, _> = self
            .counters()
            .into_iter()
            .map(|(name, _, value)| (name.to_string(), value.into()))
            .collect();
        serde_json::json!({
            "counters": counters,
            "mean_latency_micros": self.mean_latency().as_micros() as u64,
        })
    }
}

/// Times one call from admission to answer.
pub struct RequestTimer {
    started: Instant,
    metrics: Arc<GatewayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            started: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, error: Option<&GatewayError>) {
        self.metrics.record_call(error, self.started.elapsed());
    }
}
