//! Test doubles for the listener's ports.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    ClientError, PoStProof, ProofRegisterPolicy, ProverError, RequestEvent, ResponseEvent,
    SectorInfo,
};
use crate::ports::{ProofEventClient, WinningPoStProver};

/// Prover returning one proof per sector, or a fixed error.
#[derive(Debug, Default)]
pub struct MockProver {
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl MockProver {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The proofs this prover returns for `sectors` and `randomness`.
    pub fn expected(sectors: &[SectorInfo], randomness: &[u8]) -> Vec<PoStProof> {
        sectors
            .iter()
            .map(|s| PoStProof {
                post_proof: s.seal_proof,
                proof_bytes: randomness
                    .iter()
                    .map(|b| b ^ (s.sector_number as u8))
                    .collect(),
            })
            .collect()
    }
}

#[async_trait]
impl WinningPoStProver for MockProver {
    async fn compute_proof(
        &self,
        sectors: &[SectorInfo],
        randomness: &[u8],
    ) -> Result<Vec<PoStProof>, ProverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(ProverError::new(message.clone())),
            None => Ok(Self::expected(sectors, randomness)),
        }
    }
}

/// Hub stand-in driven by a script of subscription outcomes.
///
/// Each `listen_proof_event` pops the next entry; an exhausted script fails
/// the subscription. Responses are forwarded to the channel returned by
/// [`ScriptedClient::new`].
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<mpsc::Receiver<RequestEvent>, ClientError>>>,
    subscriptions: AtomicUsize,
    policies: Mutex<Vec<ProofRegisterPolicy>>,
    responses: mpsc::UnboundedSender<ResponseEvent>,
    fail_responses: bool,
}

impl ScriptedClient {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResponseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Mutex::new(VecDeque::new()),
                subscriptions: AtomicUsize::new(0),
                policies: Mutex::new(Vec::new()),
                responses: tx,
                fail_responses: false,
            },
            rx,
        )
    }

    /// Responses are still recorded but reported as failed deliveries.
    pub fn with_failing_responses(mut self) -> Self {
        self.fail_responses = true;
        self
    }

    /// Queue a successful subscription; returns the sender feeding it.
    pub fn push_stream(&self) -> mpsc::Sender<RequestEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.script.lock().unwrap().push_back(Ok(rx));
        tx
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(ClientError::Subscribe(message.to_string())));
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn policies(&self) -> Vec<ProofRegisterPolicy> {
        self.policies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProofEventClient for ScriptedClient {
    async fn listen_proof_event(
        &self,
        _session: CancellationToken,
        policy: &ProofRegisterPolicy,
    ) -> Result<mpsc::Receiver<RequestEvent>, ClientError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.policies.lock().unwrap().push(policy.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Subscribe("script exhausted".into())))
    }

    async fn response_proof_event(&self, response: ResponseEvent) -> Result<(), ClientError> {
        let id = response.id;
        let _ = self.responses.send(response);
        if self.fail_responses {
            Err(ClientError::Response(format!("connection reset while answering {id}")))
        } else {
            Ok(())
        }
    }
}
