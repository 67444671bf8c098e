//! Capabilities the listener depends on.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    ClientError, PoStProof, ProofRegisterPolicy, ProverError, RequestEvent, ResponseEvent,
    SectorInfo,
};

/// Connection to a proof hub.
#[async_trait]
pub trait ProofEventClient: Send + Sync {
    /// Subscribe as the miner named in `policy`.
    ///
    /// The stream stays open until the hub closes it or `session` is
    /// cancelled; implementations release the subscription on cancellation.
    async fn listen_proof_event(
        &self,
        session: CancellationToken,
        policy: &ProofRegisterPolicy,
    ) -> Result<mpsc::Receiver<RequestEvent>, ClientError>;

    async fn response_proof_event(&self, response: ResponseEvent) -> Result<(), ClientError>;
}

/// Local winning PoSt computation.
#[async_trait]
pub trait WinningPoStProver: Send + Sync {
    async fn compute_proof(
        &self,
        sectors: &[SectorInfo],
        randomness: &[u8],
    ) -> Result<Vec<PoStProof>, ProverError>;
}
