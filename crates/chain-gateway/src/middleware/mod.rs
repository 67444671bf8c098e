//! Middleware for the gateway.
//!
//! Call order: transport → Auth → (dispatcher) Admission → Freshness → Backend
//!
//! The auth layer is a tower layer over axum requests; admission control runs
//! inside every dispatcher method since its cost depends on the operation.

pub mod auth;
pub mod metrics;
pub mod rate_limit;

pub use auth::{AuthLayer, AuthService};
pub use metrics::{GatewayMetrics, RequestTimer};
pub use rate_limit::{AdmissionController, AdmissionError, LimitFailure, TokenBucket};
