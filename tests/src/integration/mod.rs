//! Cross-crate integration flows.

pub mod gateway_flows;
pub mod message_flows;
pub mod proof_flows;
