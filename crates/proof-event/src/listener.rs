//! Proof event listener.
//!
//! Keeps one subscription to a proof hub alive for a miner and answers every
//! `ComputeProof` request with exactly one correlated response.
//!
//! ```text
//!            subscribe ok                 stream closed
//! Connecting ───────────▶ Listening ─────────────────▶ Draining
//!     ▲   │ subscribe err                                 │
//!     │   └───────────── backoff ◀────────────────────────┘
//!     │                    │
//!     └────────────────────┘         cancel (any state) ─▶ Stopped
//! ```

use serde::{Deserialize, Serialize};
use shared_types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::domain::{
    ComputeProofRequest, DecodeError, ListenError, ProofEvent, ProofRegisterPolicy, RequestEvent,
    ResponseEvent,
};
use crate::ports::{ProofEventClient, WinningPoStProver};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Pause between sessions.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Connecting,
    Listening,
    /// The hub closed the stream; a new session follows the backoff.
    Draining,
    Stopped,
}

pub struct ProofEventListener {
    client: Arc<dyn ProofEventClient>,
    prover: Arc<dyn WinningPoStProver>,
    miner: Address,
    config: ListenerConfig,
    state: watch::Sender<ListenerState>,
    span: Span,
}

impl ProofEventListener {
    pub fn new(
        client: Arc<dyn ProofEventClient>,
        prover: Arc<dyn WinningPoStProver>,
        miner: Address,
    ) -> Self {
        let span = info_span!("proof_event", miner = %miner);
        let (state, _) = watch::channel(ListenerState::Connecting);
        Self {
            client,
            prover,
            miner,
            config: ListenerConfig::default(),
            state,
            span,
        }
    }

    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Span every log line of this listener is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn miner(&self) -> &Address {
        &self.miner
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Run sessions back to back until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let span = self.span.clone();
        self.run_loop(cancel).instrument(span).await
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            self.state.send_replace(ListenerState::Connecting);

            match self.listen_once(&cancel).await {
                Ok(()) if cancel.is_cancelled() => break,
                Ok(()) => warn!("Proof event stream closed"),
                Err(e) => error!(error = %e, "Proof event session failed"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Not restarting proof event listener: cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.config.backoff) => {}
            }
            info!("Restarting proof event listener");
        }
        self.state.send_replace(ListenerState::Stopped);
    }

    async fn listen_once(&self, cancel: &CancellationToken) -> Result<(), ListenError> {
        let session = cancel.child_token();
        let _release = session.clone().drop_guard();

        let policy = ProofRegisterPolicy {
            miner_address: self.miner.clone(),
        };
        let mut events = tokio::select! {
            biased;
            _ = session.cancelled() => return Ok(()),
            subscribed = self.client.listen_proof_event(session.clone(), &policy) => {
                subscribed.map_err(ListenError::Subscribe)?
            }
        };
        self.state.send_replace(ListenerState::Listening);

        loop {
            let event = tokio::select! {
                biased;
                _ = session.cancelled() => return Ok(()),
                event = events.recv() => event,
            };
            let Some(event) = event else {
                self.state.send_replace(ListenerState::Draining);
                return Ok(());
            };

            tokio::select! {
                biased;
                _ = session.cancelled() => return Ok(()),
                handled = self.dispatch(event) => handled?,
            }
        }
    }

    async fn dispatch(&self, event: RequestEvent) -> Result<(), ListenError> {
        match ProofEvent::decode(&event) {
            Ok(ProofEvent::InitConnect(connected)) => {
                info!(channel_id = %connected.channel_id, "Connected to proof hub");
            }
            Ok(ProofEvent::ComputeProof(request)) => {
                self.process_compute_proof(event.id, request).await;
            }
            Ok(ProofEvent::Unknown(method)) => {
                error!(id = %event.id, method = %method, "Unexpected proof event type");
            }
            Err(e @ DecodeError::InitConnect(_)) => return Err(e.into()),
            Err(DecodeError::ComputeProof(e)) => {
                warn!(id = %event.id, error = %e, "Rejecting malformed proof request");
                self.respond(ResponseEvent::failure(event.id, e.to_string()))
                    .await;
            }
        }
        Ok(())
    }

    async fn process_compute_proof(&self, id: Uuid, request: ComputeProofRequest) {
        let proofs = match self
            .prover
            .compute_proof(&request.sector_infos, &request.rand)
            .await
        {
            Ok(proofs) => proofs,
            Err(e) => {
                warn!(id = %id, error = %e, "Compute proof failed");
                return self.respond(ResponseEvent::failure(id, e.to_string())).await;
            }
        };

        let response = match serde_json::to_vec(&proofs) {
            Ok(payload) => ResponseEvent::success(id, payload),
            Err(e) => ResponseEvent::failure(id, e.to_string()),
        };
        self.respond(response).await;
    }

    async fn respond(&self, response: ResponseEvent) {
        let id = response.id;
        if let Err(e) = self.client.response_proof_event(response).await {
            error!(id = %id, error = %e, "Response proof event failed");
        }
    }
}
