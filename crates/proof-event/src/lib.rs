//! Proof Event - answers remote winning PoSt requests over a proof hub.
//!
//! A miner keeps a subscription open to one or more hubs. The hub pushes
//! `ComputeProof` requests down the stream; the listener computes the proof
//! locally and sends back a response carrying the request's id.
//!
//! # Components
//!
//! | component               | role                                             |
//! |-------------------------|--------------------------------------------------|
//! | `ProofEventListener`    | reconnecting session loop for one hub            |
//! | `ProofEventSupervisor`  | one listener per configured hub endpoint         |
//! | `PendingRequestStore`   | id → waiting caller, single completion           |
//! | `InMemoryProofHub`      | requesting side, for local deployments and tests |

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod hub;
pub mod listener;
pub mod ports;
pub mod supervisor;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use domain::*;
pub use hub::InMemoryProofHub;
pub use listener::{ListenerConfig, ListenerState, ProofEventListener};
pub use ports::{ProofEventClient, WinningPoStProver};
pub use supervisor::{ProofEventSupervisor, SHUTDOWN_GRACE};
