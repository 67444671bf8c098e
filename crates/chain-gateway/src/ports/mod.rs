//! Ports: the capabilities the gateway consumes.

pub mod outbound;

pub use outbound::{
    AuthError, ChainResolver, ManualTimeSource, SignatureError, SignatureVerifier,
    SystemTimeSource, TargetApi, TimeSource, Verifier, VerifyRequest, VerifyResponse,
};
