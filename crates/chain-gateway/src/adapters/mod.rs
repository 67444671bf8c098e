//! Adapters implementing the outbound ports.

pub mod jwt_client;
pub mod secp256k1;

pub use jwt_client::JwtClient;
pub use secp256k1::Secp256k1Verifier;
