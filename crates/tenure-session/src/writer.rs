//! Claim writer: publishes and refreshes the local session's claim.

use std::sync::Arc;
use std::time::Duration;

use tenure_core::identity;
use tenure_core::{claim_key, Clock, LocalSession, MonotonicStamper, SessionClaim, SessionConfig};
use tenure_store::SharedStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;

/// Result of a guarded clear on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Our claim was still stored and has been zeroed.
    Cleared,
    /// Another session owns the slot; left untouched.
    HeldByOther,
    /// Nothing (or a zeroed claim) was stored.
    Absent,
}

// ── Schedule ──

/// Write offsets from acquisition: each burst delay, merged with every
/// multiple of the heartbeat interval. Infinite.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    bursts: Vec<Duration>,
    next_burst: usize,
    interval: Duration,
    next_tick: u32,
}

impl HeartbeatSchedule {
    pub fn new(burst_delays: &[Duration], interval: Duration) -> Self {
        let mut bursts = burst_delays.to_vec();
        bursts.sort();
        bursts.dedup();
        Self {
            bursts,
            next_burst: 0,
            interval,
            next_tick: 1,
        }
    }
}

impl Iterator for HeartbeatSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let periodic = self.interval.saturating_mul(self.next_tick);
        match self.bursts.get(self.next_burst).copied() {
            Some(burst) if burst < periodic => {
                self.next_burst += 1;
                Some(burst)
            }
            Some(burst) if burst == periodic => {
                self.next_burst += 1;
                self.next_tick = self.next_tick.saturating_add(1);
                Some(periodic)
            }
            _ => {
                self.next_tick = self.next_tick.saturating_add(1);
                Some(periodic)
            }
        }
    }
}

// ── Writer ──

/// Owns the heartbeat task for one acquired session.
///
/// Dropping the writer cancels the heartbeat; [`ClaimWriter::release`]
/// additionally waits for it to finish and clears the claim if still ours.
pub struct ClaimWriter {
    store: Arc<dyn SharedStore>,
    claim: SessionClaim,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClaimWriter {
    /// Stamp a new session, publish its claim, and start the heartbeat.
    ///
    /// Fails if the initial claim cannot be written.
    pub async fn acquire(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        stamper: &MonotonicStamper,
        account: &str,
        client_id: &str,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let started_at = stamper.next_stamp();
        let claim = SessionClaim {
            tab_id: identity::tab_id(client_id, started_at),
            heartbeat: Some(clock.now_ms().max(started_at)),
            client_id: client_id.to_string(),
            account: account.to_string(),
            session_started_at: Some(started_at),
        };
        let key = claim_key(account);
        store.put(&key, claim.to_value()).await?;
        let start = tokio::time::Instant::now();

        tracing::info!(
            account,
            tab_id = %claim.tab_id,
            started_at,
            "session claim acquired"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            store.clone(),
            clock,
            claim.clone(),
            key,
            HeartbeatSchedule::new(&config.burst_delays, config.heartbeat_interval),
            start,
            cancel.clone(),
        ));

        Ok(Self {
            store,
            claim,
            cancel,
            task: Some(task),
        })
    }

    /// The claim as first published (heartbeat = acquisition time).
    pub fn claim(&self) -> &SessionClaim {
        &self.claim
    }

    pub fn local_session(&self) -> LocalSession {
        LocalSession {
            account: self.claim.account.clone(),
            client_id: self.claim.client_id.clone(),
            tab_id: self.claim.tab_id.clone(),
            session_started_at: self.claim.session_started_at.unwrap_or_default(),
        }
    }

    /// Token that stops the heartbeat when cancelled.
    pub fn heartbeat_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_beating(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel every pending write. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the heartbeat, wait until no write is in flight, then clear the
    /// claim only if the stored tab id is still ours.
    pub async fn release(mut self) -> Result<ReleaseOutcome, SessionError> {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "heartbeat task ended abnormally");
            }
        }

        let key = claim_key(&self.claim.account);
        let zeroed = SessionClaim::zeroed(&self.claim.account).to_value();
        let transactional = self.store.capabilities().compare_and_set;

        // Without compare-and-set this is read-check-write: a competing write
        // landing between `once` and `put` is overwritten.
        let outcome = loop {
            let Some(current) = self.store.once(&key).await? else {
                break ReleaseOutcome::Absent;
            };
            match SessionClaim::decode(&current) {
                None => break ReleaseOutcome::Absent,
                Some(c) if c.is_vacant() => break ReleaseOutcome::Absent,
                Some(c) if c.tab_id != self.claim.tab_id => break ReleaseOutcome::HeldByOther,
                Some(_) => {}
            }
            if !transactional {
                self.store.put(&key, zeroed.clone()).await?;
                break ReleaseOutcome::Cleared;
            }
            if self
                .store
                .compare_and_set(&key, &current, zeroed.clone())
                .await?
            {
                break ReleaseOutcome::Cleared;
            }
            // Slot changed under us; re-read and decide again.
        };

        tracing::info!(
            account = %self.claim.account,
            tab_id = %self.claim.tab_id,
            ?outcome,
            "session claim released"
        );
        Ok(outcome)
    }
}

impl Drop for ClaimWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_heartbeat(
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    claim: SessionClaim,
    key: String,
    schedule: HeartbeatSchedule,
    start: tokio::time::Instant,
    cancel: CancellationToken,
) {
    let started_at = claim.session_started_at.unwrap_or_default();
    for offset in schedule {
        let Some(due) = start.checked_add(offset) else {
            tracing::warn!(key = %key, ?offset, "heartbeat schedule out of range; stopping");
            return;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(due) => {}
        }
        let beat = claim.beat(clock.now_ms().max(started_at));
        if let Err(e) = store.put(&key, beat.to_value()).await {
            tracing::warn!(key = %key, error = %e, "heartbeat write failed");
        }
    }
}
