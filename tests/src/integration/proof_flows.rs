//! # Proof Event Flows
//!
//! A miner answering winning PoSt requests from several hubs at once.
//!
//! ## Flows Tested:
//!
//! 1. **Hub → Listener → Prover → Hub**: correlated round trip per endpoint
//! 2. **Reconnect**: a hub dropping the miner sees it come back after backoff
//! 3. **Remote failure**: prover errors surface to the requesting side
//! 4. **Shutdown**: the supervisor stops every listener and the hubs see it

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use proof_event::testing::MockProver;
    use proof_event::{
        ComputeProofRequest, HubError, InMemoryProofHub, ListenerState, ProofEventClient,
        ProofEventSupervisor, SectorInfo,
    };
    use shared_types::{Address, Cid};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn miner() -> Address {
        Address::from("f01000")
    }

    fn request(sectors: u64) -> ComputeProofRequest {
        ComputeProofRequest {
            sector_infos: (0..sectors)
                .map(|n| SectorInfo {
                    seal_proof: 8,
                    sector_number: n,
                    sealed_cid: Cid::new(format!("bafysealed{n}")),
                })
                .collect(),
            rand: vec![0x5a; 32],
        }
    }

    fn hubs(n: usize) -> Vec<Arc<InMemoryProofHub>> {
        crate::init_test_logging();
        (0..n).map(|_| Arc::new(InMemoryProofHub::new())).collect()
    }

    fn clients(hubs: &[Arc<InMemoryProofHub>]) -> Vec<Arc<dyn ProofEventClient>> {
        hubs.iter()
            .map(|h| h.clone() as Arc<dyn ProofEventClient>)
            .collect()
    }

    async fn all_listening(supervisor: &ProofEventSupervisor) {
        for mut state in supervisor.states() {
            state
                .wait_for(|s| *s == ListenerState::Listening)
                .await
                .unwrap();
        }
    }

    async fn until_connected(hub: &InMemoryProofHub) {
        while !hub.is_connected(&miner()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // =============================================================================
    // INTEGRATION TESTS: HUB ⇄ LISTENER
    // =============================================================================

    #[tokio::test]
    async fn test_every_hub_gets_its_own_answer() {
        let hubs = hubs(2);
        let prover = Arc::new(MockProver::default());
        let supervisor = ProofEventSupervisor::start(
            prover.clone(),
            clients(&hubs),
            miner(),
            CancellationToken::new(),
        );
        all_listening(&supervisor).await;

        let miner = miner();
        let (two, three) = (request(2), request(3));
        let (a, b) = tokio::join!(
            hubs[0].compute_proof(&miner, &two, Duration::from_secs(5)),
            hubs[1].compute_proof(&miner, &three, Duration::from_secs(5)),
        );

        assert_eq!(a.unwrap(), MockProver::expected(&two.sector_infos, &two.rand));
        assert_eq!(b.unwrap().len(), 3);
        assert_eq!(prover.calls(), 2);
        assert!(hubs.iter().all(|h| h.pending().pending_count() == 0));

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_miner_reconnects_after_backoff() {
        let hubs = hubs(1);
        let supervisor = ProofEventSupervisor::start(
            Arc::new(MockProver::default()),
            clients(&hubs),
            miner(),
            CancellationToken::new(),
        );
        all_listening(&supervisor).await;
        let first_channel = hubs[0].channel_id(&miner());

        assert!(hubs[0].disconnect(&miner()));
        let err = hubs[0]
            .compute_proof(&miner(), &request(1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotConnected(_)));

        until_connected(&hubs[0]).await;
        assert_ne!(hubs[0].channel_id(&miner()), first_channel);

        let proofs = hubs[0]
            .compute_proof(&miner(), &request(1), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(proofs.len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_prover_failure_reaches_requester() {
        let hubs = hubs(1);
        let supervisor = ProofEventSupervisor::start(
            Arc::new(MockProver::failing("faulty sector 0")),
            clients(&hubs),
            miner(),
            CancellationToken::new(),
        );
        all_listening(&supervisor).await;

        let err = hubs[0]
            .compute_proof(&miner(), &request(1), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Remote(ref m) if m == "faulty sector 0"));
        assert_eq!(hubs[0].pending().snapshot().completed, 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_hub_channels() {
        let hubs = hubs(3);
        let supervisor = ProofEventSupervisor::start(
            Arc::new(MockProver::default()),
            clients(&hubs),
            miner(),
            CancellationToken::new(),
        );
        all_listening(&supervisor).await;
        let states = supervisor.states();

        supervisor.shutdown().await;

        assert!(states.iter().all(|s| *s.borrow() == ListenerState::Stopped));
        for hub in &hubs {
            for _ in 0..100 {
                if !hub.is_connected(&miner()) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            assert!(!hub.is_connected(&miner()));
        }
    }
}
