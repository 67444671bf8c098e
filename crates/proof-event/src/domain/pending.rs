//! Outstanding proof requests awaiting a correlated [`ResponseEvent`].
//!
//! Each request is owned by the store from `register` until exactly one
//! terminal outcome: completion, cancellation or expiry. Removal from the
//! map happens before delivery, so a slot never has two writers.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::ResponseEvent;

struct PendingRequest {
    sender: oneshot::Sender<ResponseEvent>,
    issued_at: Instant,
    method: String,
    timeout: Duration,
}

#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub in_flight: usize,
}

pub struct PendingRequestStore {
    pending: DashMap<Uuid, PendingRequest>,
    default_timeout: Duration,
    stats: Arc<PendingStats>,
}

impl PendingRequestStore {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Open a slot and hand back its id and the receiving end.
    pub fn register(
        &self,
        method: &str,
        timeout: Option<Duration>,
    ) -> (Uuid, oneshot::Receiver<ResponseEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            id,
            PendingRequest {
                sender: tx,
                issued_at: Instant::now(),
                method: method.to_string(),
                timeout: timeout.unwrap_or(self.default_timeout),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, method, "Registered pending proof request");

        (id, rx)
    }

    /// Deliver `response` to the request it names.
    ///
    /// Returns false for unknown ids and for requests whose caller already
    /// went away.
    pub fn complete(&self, response: ResponseEvent) -> bool {
        let id = response.id;
        let Some((_, pending)) = self.pending.remove(&id) else {
            warn!(id = %id, "Response for unknown or expired proof request");
            return false;
        };

        let elapsed = pending.issued_at.elapsed();
        match pending.sender.send(response) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    id = %id,
                    method = pending.method,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Completed pending proof request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(id = %id, method = pending.method, "Proof request caller went away");
                false
            }
        }
    }

    /// Drop the slot without delivering anything.
    pub fn cancel(&self, id: &Uuid) -> bool {
        if self.pending.remove(id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Tie the slot to the caller's scope: dropping the guard cancels it
    /// unless a terminal outcome already removed it.
    pub fn guard(&self, id: Uuid) -> PendingGuard<'_> {
        PendingGuard { store: self, id }
    }

    /// Drop the slot because its caller stopped waiting on a deadline.
    pub fn expire(&self, id: &Uuid) -> bool {
        if self.pending.remove(id).is_some() {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Sweep every slot older than its timeout. Returns how many went.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, request| {
            let age = now.duration_since(request.issued_at);
            if age <= request.timeout {
                return true;
            }
            warn!(
                id = %id,
                method = request.method,
                age_ms = age.as_millis() as u64,
                "Dropping expired proof request"
            );
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            removed += 1;
            false
        });

        removed
    }

    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            registered: self.stats.total_registered.load(Ordering::Relaxed),
            completed: self.stats.total_completed.load(Ordering::Relaxed),
            timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            in_flight: self.pending.len(),
        }
    }
}

/// Cancels a pending request when the caller that registered it goes away.
#[must_use = "the request is cancelled as soon as the guard is dropped"]
pub struct PendingGuard<'a> {
    store: &'a PendingRequestStore,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.store.cancel(&self.id) {
            debug!(id = %self.id, "Proof request abandoned by caller");
        }
    }
}

/// Periodically sweep expired requests until `cancel` fires.
pub async fn cleanup_task(
    store: Arc<PendingRequestStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = store.remove_expired();
                if removed > 0 {
                    debug!(removed, "Swept expired proof requests");
                }
            }
        }
    }
}
