//! [`Messager`]: the message service client callers hold.
//!
//! Besides forwarding calls, it implements `wait_message`, a level-triggered
//! poll that re-reads the full message state on every tick until the message
//! settles, fails or the caller gives up.

use dashmap::DashMap;
use shared_types::{Address, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{MessagerError, WaitError};
use crate::ports::MessagerApi;
use crate::rpc_client::RpcMessagerClient;
use crate::types::{MessageState, MessagerConfig, MsgDetail, MsgMeta};

#[derive(Debug, Clone)]
enum Outcome {
    Landed(MsgDetail),
    Failed(String),
}

/// A terminal outcome and when it was observed.
#[derive(Debug, Clone)]
struct Settled {
    outcome: Outcome,
    at: Instant,
}

/// What one fetch says about the wait.
#[derive(Debug, PartialEq)]
enum Verdict {
    Done,
    Failed(String),
    Pending,
}

fn judge(detail: &MsgDetail, confidence: u64) -> Verdict {
    match detail.state {
        MessageState::Failed => Verdict::Failed(detail.failure_reason()),
        state if state.counts_confidence() && observed(detail) >= confidence => Verdict::Done,
        _ => Verdict::Pending,
    }
}

fn observed(detail: &MsgDetail) -> u64 {
    u64::try_from(detail.confidence).unwrap_or(0)
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Messager {
    api: Arc<dyn MessagerApi>,
    poll_interval: Duration,
    /// Bounded by `settled_ttl` and `settled_capacity`.
    settled: DashMap<String, Settled>,
    settled_ttl: Duration,
    settled_capacity: usize,
}

impl Messager {
    pub fn new(api: Arc<dyn MessagerApi>, config: &MessagerConfig) -> Self {
        Self {
            api,
            poll_interval: if config.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                config.poll_interval
            },
            settled: DashMap::new(),
            settled_ttl: config.settled_ttl,
            settled_capacity: config.settled_capacity,
        }
    }

    /// Connect to the service at `config.url` over JSON-RPC.
    pub fn connect(config: &MessagerConfig) -> Result<Self, MessagerError> {
        let client = RpcMessagerClient::new(config)?;
        info!(url = %client.rpc_url(), "Using remote messager");
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until message `id` has at least `confidence` confirmations.
    ///
    /// Fetches once immediately, then once per poll interval. A tick that
    /// fires while a fetch is outstanding is skipped. Fetch errors end the
    /// wait; cancellation ends it at once, abandoning any fetch in flight.
    #[instrument(skip(self, cancel), fields(id = %id))]
    pub async fn wait_message(
        &self,
        cancel: &CancellationToken,
        id: &str,
        confidence: u64,
    ) -> Result<MsgDetail, WaitError> {
        if let Some(result) = self.cached(id, confidence) {
            debug!("Answered from settled messages");
            return result;
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = ticker.tick() => {}
            }

            let detail = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                fetched = self.api.get_message_by_uid(id) => fetched?,
            };

            match judge(&detail, confidence) {
                Verdict::Done => {
                    self.remember(id, Outcome::Landed(detail.clone()));
                    return Ok(detail);
                }
                Verdict::Failed(reason) => {
                    warn!(reason = %reason, "Message failed");
                    self.remember(id, Outcome::Failed(reason.clone()));
                    return Err(WaitError::Failed { reason });
                }
                Verdict::Pending => {
                    debug!(
                        state = ?detail.state,
                        observed = detail.confidence,
                        "Message not settled yet"
                    );
                }
            }
        }
    }

    fn cached(&self, id: &str, confidence: u64) -> Option<Result<MsgDetail, WaitError>> {
        if self
            .settled
            .remove_if(id, |_, s| s.at.elapsed() >= self.settled_ttl)
            .is_some()
        {
            return None;
        }
        match &self.settled.get(id)?.outcome {
            Outcome::Landed(detail) if observed(detail) >= confidence => Some(Ok(detail.clone())),
            Outcome::Landed(_) => None,
            Outcome::Failed(reason) => Some(Err(WaitError::Failed {
                reason: reason.clone(),
            })),
        }
    }

    fn remember(&self, id: &str, outcome: Outcome) {
        if self.settled_capacity == 0 {
            return;
        }
        self.settled.insert(
            id.to_string(),
            Settled {
                outcome,
                at: Instant::now(),
            },
        );
        if self.settled.len() <= self.settled_capacity {
            return;
        }

        self.settled
            .retain(|_, s| s.at.elapsed() < self.settled_ttl);
        let excess = self.settled.len().saturating_sub(self.settled_capacity);
        if excess > 0 {
            let mut by_age: Vec<(Instant, String)> = self
                .settled
                .iter()
                .map(|e| (e.at, e.key().clone()))
                .collect();
            by_age.sort_unstable();
            for (_, oldest) in by_age.into_iter().take(excess) {
                self.settled.remove(&oldest);
            }
        }
        debug!(remembered = self.settled.len(), "Evicted settled messages");
    }

    /// Number of settled outcomes currently remembered.
    pub fn settled_len(&self) -> usize {
        self.settled.len()
    }

    /// Drop the settled outcome remembered for `id`.
    pub fn forget(&self, id: &str) -> bool {
        self.settled.remove(id).is_some()
    }

    #[instrument(skip(self), fields(addr = %addr))]
    pub async fn wallet_has(&self, addr: &Address) -> Result<bool, MessagerError> {
        self.api.wallet_has(addr).await
    }

    #[instrument(skip(self))]
    pub async fn has_message_by_uid(&self, id: &str) -> Result<bool, MessagerError> {
        self.api.has_message_by_uid(id).await
    }

    #[instrument(skip(self, msg, meta), fields(from = %msg.from, nonce = msg.nonce))]
    pub async fn push_message(&self, msg: &Message, meta: &MsgMeta) -> Result<String, MessagerError> {
        self.api.push_message(msg, meta).await
    }

    #[instrument(skip(self, msg, meta), fields(from = %msg.from))]
    pub async fn push_message_with_id(
        &self,
        id: &str,
        msg: &Message,
        meta: &MsgMeta,
    ) -> Result<String, MessagerError> {
        self.api.push_message_with_id(id, msg, meta).await
    }

    #[instrument(skip(self))]
    pub async fn get_message_by_uid(&self, id: &str) -> Result<MsgDetail, MessagerError> {
        self.api.get_message_by_uid(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detail, failed, ScriptedMessager};

    const INTERVAL: Duration = Duration::from_secs(30);

    fn messager(api: Arc<ScriptedMessager>) -> Messager {
        let config = MessagerConfig::new("http://messager", "");
        Messager::new(api, &config)
    }

    #[test]
    fn test_judge() {
        assert_eq!(judge(&detail("m", MessageState::Final, 1), 1), Verdict::Done);
        assert_eq!(judge(&detail("m", MessageState::Final, 0), 1), Verdict::Pending);
        assert_eq!(judge(&detail("m", MessageState::Superseded, 3), 2), Verdict::Done);
        assert_eq!(judge(&detail("m", MessageState::PendingOffChain, 9), 0), Verdict::Pending);
        assert_eq!(judge(&detail("m", MessageState::Unknown, 9), 0), Verdict::Pending);
        assert_eq!(judge(&detail("m", MessageState::Final, -1), 0), Verdict::Done);
        assert_eq!(
            judge(&detail("m", MessageState::Failed, 0), 0),
            Verdict::Failed(String::new())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_third_fetch() {
        let api = Arc::new(ScriptedMessager::new());
        api.script(
            "m1",
            (0..5)
                .map(|c| Ok(detail("m1", MessageState::PendingOnChain, c)))
                .collect(),
        );
        let messager = messager(api.clone());
        let started = Instant::now();

        let found = messager
            .wait_message(&CancellationToken::new(), "m1", 2)
            .await
            .unwrap();

        assert_eq!(found.confidence, 2);
        assert_eq!(api.fetches("m1"), 3);
        assert_eq!(started.elapsed().as_secs(), 2 * INTERVAL.as_secs());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_immediate_with_receipt_text() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(failed("m1", "out of gas"))]);
        let messager = messager(api.clone());
        let started = Instant::now();

        let err = messager
            .wait_message(&CancellationToken::new(), "m1", 5)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "msg failed due to out of gas");
        assert_eq!(api.fetches("m1"), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_receipt_has_empty_reason() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(detail("m1", MessageState::Failed, 0))]);

        let err = messager(api)
            .wait_message(&CancellationToken::new(), "m1", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Failed { ref reason } if reason.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_triggered_through_replacement() {
        let api = Arc::new(ScriptedMessager::new());
        api.script(
            "m1",
            vec![
                Ok(detail("m1", MessageState::PendingOffChain, 0)),
                Ok(detail("m1", MessageState::Unknown, 0)),
                Ok(detail("m1", MessageState::Superseded, 1)),
            ],
        );

        let found = messager(api.clone())
            .wait_message(&CancellationToken::new(), "m1", 1)
            .await
            .unwrap();
        assert_eq!(found.state, MessageState::Superseded);
        assert_eq!(api.fetches("m1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_wait_served_from_settled() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(detail("m1", MessageState::Final, 3))]);
        api.script("m2", vec![Ok(failed("m2", "reverted"))]);
        let messager = messager(api.clone());
        let cancel = CancellationToken::new();

        let first = messager.wait_message(&cancel, "m1", 2).await.unwrap();
        let again = messager.wait_message(&cancel, "m1", 3).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(api.fetches("m1"), 1);

        messager.wait_message(&cancel, "m1", 3).await.unwrap();
        messager.wait_message(&cancel, "m1", 0).await.unwrap();
        assert_eq!(api.fetches("m1"), 1);

        for _ in 0..2 {
            let err = messager.wait_message(&cancel, "m2", 0).await.unwrap_err();
            assert_eq!(err.to_string(), "msg failed due to reverted");
        }
        assert_eq!(api.fetches("m2"), 1);

        assert!(messager.forget("m1"));
        messager.wait_message(&cancel, "m1", 0).await.unwrap();
        assert_eq!(api.fetches("m1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_outcome_expires_after_ttl() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(detail("m1", MessageState::Final, 1))]);
        let config = MessagerConfig {
            settled_ttl: Duration::from_secs(60),
            ..MessagerConfig::new("http://messager", "")
        };
        let messager = Messager::new(api.clone(), &config);
        let cancel = CancellationToken::new();

        messager.wait_message(&cancel, "m1", 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        messager.wait_message(&cancel, "m1", 1).await.unwrap();
        assert_eq!(api.fetches("m1"), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        messager.wait_message(&cancel, "m1", 1).await.unwrap();
        assert_eq!(api.fetches("m1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_outcomes_bounded_by_capacity() {
        let api = Arc::new(ScriptedMessager::new());
        for n in 0..5 {
            let id = format!("m{n}");
            api.script(&id, vec![Ok(detail(&id, MessageState::Final, 1))]);
        }
        let config = MessagerConfig {
            settled_capacity: 3,
            ..MessagerConfig::new("http://messager", "")
        };
        let messager = Messager::new(api.clone(), &config);
        let cancel = CancellationToken::new();

        for n in 0..5 {
            messager
                .wait_message(&cancel, &format!("m{n}"), 1)
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(messager.settled_len(), 3);

        // The two oldest were evicted and need a fresh fetch.
        messager.wait_message(&cancel, "m0", 1).await.unwrap();
        messager.wait_message(&cancel, "m4", 1).await.unwrap();
        assert_eq!(api.fetches("m0"), 2);
        assert_eq!(api.fetches("m4"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stricter_wait_refetches() {
        let api = Arc::new(ScriptedMessager::new());
        api.script(
            "m1",
            vec![
                Ok(detail("m1", MessageState::Final, 1)),
                Ok(detail("m1", MessageState::Final, 4)),
            ],
        );
        let messager = messager(api.clone());
        let cancel = CancellationToken::new();

        messager.wait_message(&cancel, "m1", 1).await.unwrap();
        let deeper = messager.wait_message(&cancel, "m1", 4).await.unwrap();
        assert_eq!(deeper.confidence, 4);
        assert_eq!(api.fetches("m1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(detail("m1", MessageState::PendingOffChain, 0))]);
        let messager = Arc::new(messager(api.clone()));
        let cancel = CancellationToken::new();

        let task = {
            let messager = messager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { messager.wait_message(&cancel, "m1", 1).await })
        };

        tokio::time::sleep(Duration::from_secs(45)).await;
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, WaitError::Cancelled));
        assert_eq!(api.fetches("m1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_inflight_fetch() {
        let api = Arc::new(ScriptedMessager::new());
        api.script("m1", vec![Ok(detail("m1", MessageState::Final, 9))]);
        api.set_fetch_delay(Duration::from_secs(600));
        let messager = Arc::new(messager(api.clone()));
        let cancel = CancellationToken::new();

        let task = {
            let messager = messager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { messager.wait_message(&cancel, "m1", 0).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        assert!(matches!(task.await.unwrap(), Err(WaitError::Cancelled)));
        assert_eq!(api.fetches("m1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_coalesces_ticks() {
        let api = Arc::new(ScriptedMessager::new());
        api.script(
            "m1",
            vec![
                Ok(detail("m1", MessageState::PendingOnChain, 0)),
                Ok(detail("m1", MessageState::PendingOnChain, 1)),
            ],
        );
        // Each fetch spans several poll intervals.
        api.set_fetch_delay(Duration::from_secs(100));
        let messager = messager(api.clone());

        messager
            .wait_message(&CancellationToken::new(), "m1", 1)
            .await
            .unwrap();
        assert_eq!(api.fetches("m1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_returned_unchanged() {
        let api = Arc::new(ScriptedMessager::new());
        let err = messager(api)
            .wait_message(&CancellationToken::new(), "missing", 0)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "messager rpc error 1: message missing not found");
    }

    #[tokio::test]
    async fn test_forwarding() {
        let api = Arc::new(ScriptedMessager::new());
        api.add_wallet(Address::from("f1wallet"));
        let messager = messager(api.clone());

        assert!(messager.wallet_has(&Address::from("f1wallet")).await.unwrap());
        assert!(!messager.wallet_has(&Address::from("f1other")).await.unwrap());

        let msg = detail("x", MessageState::Unknown, 0).message;
        let id = messager.push_message(&msg, &MsgMeta::default()).await.unwrap();
        assert_eq!(id, "msg-1");
        let id = messager
            .push_message_with_id("mine", &msg, &MsgMeta::default())
            .await
            .unwrap();
        assert_eq!(id, "mine");
        assert!(messager.has_message_by_uid("mine").await.unwrap());
        assert_eq!(api.pushed().len(), 2);
    }
}
