//! In-process proof hub.
//!
//! The requesting side of the event channel: miners subscribe through
//! [`ProofEventClient`], and local callers ask a connected miner for a proof
//! with [`InMemoryProofHub::compute_proof`]. Answers are matched back to
//! callers through a [`PendingRequestStore`].

use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    ClientError, ComputeProofRequest, ConnectedCompleted, HubError, PendingRequestStore,
    PoStProof, ProofRegisterPolicy, RequestEvent, ResponseEvent, COMPUTE_PROOF, INIT_CONNECT,
};
use crate::ports::ProofEventClient;

const DEFAULT_BUFFER: usize = 16;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct Channel {
    id: Uuid,
    sender: mpsc::Sender<RequestEvent>,
}

pub struct InMemoryProofHub {
    channels: Arc<DashMap<Address, Channel>>,
    pending: Arc<PendingRequestStore>,
    buffer: usize,
}

impl Default for InMemoryProofHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProofHub {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// `default_timeout` applies to requests swept by the pending store's
    /// cleanup; [`compute_proof`](Self::compute_proof) always passes its own.
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            pending: Arc::new(PendingRequestStore::new(default_timeout)),
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn pending(&self) -> &Arc<PendingRequestStore> {
        &self.pending
    }

    pub fn is_connected(&self, miner: &Address) -> bool {
        self.channels
            .get(miner)
            .is_some_and(|c| !c.sender.is_closed())
    }

    /// Id of the miner's current channel, as announced in `InitConnect`.
    pub fn channel_id(&self, miner: &Address) -> Option<Uuid> {
        self.channels.get(miner).map(|c| c.id)
    }

    /// Close the miner's stream. The listener sees end-of-stream.
    pub fn disconnect(&self, miner: &Address) -> bool {
        let removed = self.channels.remove(miner).is_some();
        if removed {
            info!(miner = %miner, "Disconnected miner");
        }
        removed
    }

    /// Push a raw event to the miner, bypassing correlation.
    pub async fn send_event(&self, miner: &Address, event: RequestEvent) -> Result<(), HubError> {
        let sender = self.sender(miner)?;
        sender
            .send(event)
            .await
            .map_err(|_| HubError::Disconnected(miner.clone()))
    }

    /// Ask `miner` for a winning PoSt and wait up to `timeout` for it.
    #[instrument(skip(self, request), fields(miner = %miner, sectors = request.sector_infos.len()))]
    pub async fn compute_proof(
        &self,
        miner: &Address,
        request: &ComputeProofRequest,
        timeout: Duration,
    ) -> Result<Vec<PoStProof>, HubError> {
        let sender = self.sender(miner)?;
        let payload = serde_json::to_vec(request).map_err(HubError::Encode)?;

        let (id, rx) = self.pending.register(COMPUTE_PROOF, Some(timeout));
        // Released however this future ends, including being dropped.
        let _slot = self.pending.guard(id);
        let event = RequestEvent {
            id,
            method: COMPUTE_PROOF.to_string(),
            payload,
        };
        if sender.send(event).await.is_err() {
            return Err(HubError::Disconnected(miner.clone()));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(HubError::Abandoned),
            Err(_) => {
                self.pending.expire(&id);
                warn!(id = %id, "Proof request timed out");
                return Err(HubError::Timeout(timeout));
            }
        };

        if response.is_error() {
            return Err(HubError::Remote(response.error));
        }
        serde_json::from_slice(&response.payload).map_err(HubError::Decode)
    }

    fn sender(&self, miner: &Address) -> Result<mpsc::Sender<RequestEvent>, HubError> {
        self.channels
            .get(miner)
            .map(|c| c.sender.clone())
            .ok_or_else(|| HubError::NotConnected(miner.clone()))
    }
}

#[async_trait]
impl ProofEventClient for InMemoryProofHub {
    async fn listen_proof_event(
        &self,
        session: CancellationToken,
        policy: &ProofRegisterPolicy,
    ) -> Result<mpsc::Receiver<RequestEvent>, ClientError> {
        let miner = policy.miner_address.clone();
        let channel_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);

        let hello = serde_json::to_vec(&ConnectedCompleted { channel_id })
            .map_err(|e| ClientError::Subscribe(e.to_string()))?;
        tx.send(RequestEvent::new(INIT_CONNECT, hello))
            .await
            .map_err(|e| ClientError::Subscribe(e.to_string()))?;

        if self
            .channels
            .insert(miner.clone(), Channel { id: channel_id, sender: tx })
            .is_some()
        {
            info!(miner = %miner, "Replaced existing miner channel");
        }
        debug!(miner = %miner, channel_id = %channel_id, "Miner subscribed");

        let channels = self.channels.clone();
        tokio::spawn(async move {
            session.cancelled().await;
            channels.remove_if(&miner, |_, c| c.id == channel_id);
        });

        Ok(rx)
    }

    async fn response_proof_event(&self, response: ResponseEvent) -> Result<(), ClientError> {
        let id = response.id;
        if self.pending.complete(response) {
            Ok(())
        } else {
            Err(ClientError::UnknownRequest(id))
        }
    }
}
