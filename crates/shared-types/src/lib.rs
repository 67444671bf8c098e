//! # Shared Types Crate
//!
//! Chain primitives shared across the gateway workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   (gateway, proof listener, messager) is defined here.
//! - **Valid by Construction**: a [`TipSet`] always holds at least one block;
//!   the constructor and deserializer both refuse an empty block list.
//! - **Opaque Identifiers**: CIDs and addresses are carried in string form;
//!   nothing here parses multihashes or address protocols.

pub mod entities;
pub mod errors;
pub mod messages;

pub use entities::*;
pub use errors::*;
pub use messages::*;
