//! Domain layer: event shapes, errors and the pending-request store.

pub mod error;
pub mod events;
pub mod pending;

pub use error::{ClientError, HubError, ListenError, ProverError};
pub use events::{
    ComputeProofRequest, ConnectedCompleted, DecodeError, PoStProof, ProofEvent,
    ProofRegisterPolicy, RequestEvent, ResponseEvent, SectorInfo, COMPUTE_PROOF, INIT_CONNECT,
};
pub use pending::{
    cleanup_task, PendingGuard, PendingRequestStore, PendingSnapshot, PendingStats,
};
