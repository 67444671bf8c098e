// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Chain Gateway - trust-bounded RPC facade in front of a full node.
//!
//! Untrusted callers reach the node only through [`GatewayNode`], which
//! charges every call against token buckets and refuses requests that
//! reference chain state older than the lookback cap.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         CHAIN GATEWAY                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   transport (axum)                                                   │
//! │        │                                                             │
//! │  ┌─────┴──────────────┐     Verifier (JwtClient → <auth>/verify)     │
//! │  │     AuthLayer      │───────────────────────────────────────────▶  │
//! │  └─────┬──────────────┘                                              │
//! │        │  Permissions (request extension)                            │
//! │  ┌─────┴──────────────────────────────────────────────┐              │
//! │  │                  GatewayNode                       │              │
//! │  │  registry → AdmissionController → Freshness → fwd  │              │
//! │  │   (cost)     (conn + global buckets)  (lookback)   │              │
//! │  └─────┬──────────────────────────────────────────────┘              │
//! └────────┼─────────────────────────────────────────────────────────────┘
//!          │
//!     TargetApi (trusted node)
//! ```
//!
//! # Cost Classes
//!
//! | class  | tokens | examples                                  |
//! |--------|--------|-------------------------------------------|
//! | basic  | 1      | `Version`                                 |
//! | wallet | 1      | `MsigGetVested`, `MsigGetPending`         |
//! | chain  | 2      | `ChainHead`, `ChainGetTipSetByHeight`     |
//! | state  | 3      | `StateGetActor`, `MpoolPush`              |
//! | free   | 0      | `Discover`                                |
//!
//! # Usage
//!
//! ```ignore
//! use chain_gateway::{CallContext, GatewayConfig, GatewayNode};
//!
//! let node = GatewayNode::with_config(&GatewayConfig::default(), target);
//! let ctx = node.connection_context(cancel);
//! let head = node.chain_head(&ctx).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod rpc;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports for public API
pub use adapters::{JwtClient, Secp256k1Verifier};
pub use domain::config::{AuthConfig, FreshnessConfig, GatewayConfig, RateLimitConfig};
pub use domain::context::CallContext;
pub use domain::error::{ApiError, ApiResult, GatewayError, GatewayResult};
pub use domain::freshness::{FreshnessError, FreshnessValidator, StaleError};
pub use domain::methods::{get_method_info, is_method_supported, MethodInfo, OperationClass};
pub use domain::permission::{Permission, Permissions};
pub use domain::types::*;
pub use middleware::{AdmissionController, AdmissionError, AuthLayer, GatewayMetrics};
pub use ports::{SignatureVerifier, TargetApi, TimeSource, Verifier};
pub use rpc::GatewayNode;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
