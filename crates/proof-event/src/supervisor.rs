//! One listener per proof hub endpoint, started and stopped together.

use shared_types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::listener::{ListenerConfig, ListenerState, ProofEventListener};
use crate::ports::{ProofEventClient, WinningPoStProver};

/// How long `shutdown` waits for each listener to exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Supervised {
    endpoint: usize,
    listener: Arc<ProofEventListener>,
    handle: JoinHandle<()>,
}

pub struct ProofEventSupervisor {
    cancel: CancellationToken,
    tasks: Vec<Supervised>,
    grace: Duration,
}

impl ProofEventSupervisor {
    pub fn start(
        prover: Arc<dyn WinningPoStProver>,
        clients: Vec<Arc<dyn ProofEventClient>>,
        miner: Address,
        cancel: CancellationToken,
    ) -> Self {
        Self::start_with_config(prover, clients, miner, ListenerConfig::default(), cancel)
    }

    pub fn start_with_config(
        prover: Arc<dyn WinningPoStProver>,
        clients: Vec<Arc<dyn ProofEventClient>>,
        miner: Address,
        config: ListenerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let tasks = clients
            .into_iter()
            .enumerate()
            .map(|(endpoint, client)| {
                let span = info_span!("proof_event", miner = %miner, endpoint);
                let listener = Arc::new(
                    ProofEventListener::new(client, prover.clone(), miner.clone())
                        .with_config(config.clone())
                        .with_span(span),
                );
                let handle = listener.clone().spawn(cancel.clone());
                Supervised {
                    endpoint,
                    listener,
                    handle,
                }
            })
            .collect::<Vec<_>>();

        info!(miner = %miner, endpoints = tasks.len(), "Started proof event listeners");
        Self {
            cancel,
            tasks,
            grace: SHUTDOWN_GRACE,
        }
    }

    /// How long `shutdown` waits for each listener before aborting it.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// State receivers, in endpoint order.
    pub fn states(&self) -> Vec<watch::Receiver<ListenerState>> {
        self.tasks
            .iter()
            .map(|t| t.listener.subscribe_state())
            .collect()
    }

    /// Cancel every listener and wait for each to exit.
    ///
    /// A listener still running after the grace period (default
    /// [`SHUTDOWN_GRACE`]) is logged and aborted, and its exit is still
    /// awaited: no listener task outlives this call.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for mut task in self.tasks {
            match tokio::time::timeout(self.grace, &mut task.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(endpoint = task.endpoint, error = %e, "Proof event listener panicked"),
                Err(_) => {
                    warn!(endpoint = task.endpoint, "Proof event listener did not stop in time");
                    task.handle.abort();
                    if let Err(e) = task.handle.await {
                        if !e.is_cancelled() {
                            warn!(endpoint = task.endpoint, error = %e, "Proof event listener panicked");
                        }
                    }
                }
            }
        }
    }
}
