//! Domain layer: configuration, errors, method registry and chain freshness
//! rules.

pub mod config;
pub mod context;
pub mod error;
pub mod freshness;
pub mod methods;
pub mod permission;
pub mod types;
