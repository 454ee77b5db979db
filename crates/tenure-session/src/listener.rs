//! Conflict listener: watches the account's claim and yields on a lost arbitration.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tenure_core::{yield_verdict, LocalSession, SessionClaim};
use tenure_store::Subscription;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::ConflictHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    /// Lost an arbitration; shutting down.
    Closing,
    LoggedOut,
}

/// Lifecycle flag shared by the listener and the host.
#[derive(Debug)]
pub struct SessionState(AtomicU8);

const ACTIVE: u8 = 0;
const CLOSING: u8 = 1;
const LOGGED_OUT: u8 = 2;

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(ACTIVE))
    }

    pub fn phase(&self) -> SessionPhase {
        match self.0.load(Ordering::SeqCst) {
            ACTIVE => SessionPhase::Active,
            CLOSING => SessionPhase::Closing,
            _ => SessionPhase::LoggedOut,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    /// Active → Closing. Returns false if some other path got there first.
    pub fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(ACTIVE, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn mark_logged_out(&self) {
        self.0.store(LOGGED_OUT, Ordering::SeqCst);
    }
}

/// Background task consuming one claim subscription.
///
/// Never writes to the store. On a yield verdict it stops the heartbeat,
/// drops the subscription, and calls the handler exactly once.
pub struct ConflictListener {
    cancel: CancellationToken,
    displaced: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConflictListener {
    pub fn spawn(
        subscription: Subscription,
        local: LocalSession,
        state: Arc<SessionState>,
        heartbeat: CancellationToken,
        handler: Arc<dyn ConflictHandler>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let displaced = CancellationToken::new();
        let task = tokio::spawn(listen(
            subscription,
            local,
            state,
            heartbeat,
            handler,
            cancel.clone(),
            displaced.clone(),
        ));
        Self {
            cancel,
            displaced,
            task: Some(task),
        }
    }

    /// Cancelled once the handler has run after a lost arbitration.
    pub fn displaced(&self) -> CancellationToken {
        self.displaced.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the task (and any running handler) to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "conflict listener ended abnormally");
            }
        }
    }
}

impl Drop for ConflictListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn listen(
    mut subscription: Subscription,
    local: LocalSession,
    state: Arc<SessionState>,
    heartbeat: CancellationToken,
    handler: Arc<dyn ConflictHandler>,
    cancel: CancellationToken,
    displaced: CancellationToken,
) {
    loop {
        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            v = subscription.recv() => v,
        };
        let Some(value) = value else {
            break;
        };
        // Duplicate deliveries after logout or mid-close are ignored.
        if !state.is_active() {
            continue;
        }

        let incoming = SessionClaim::decode(&value);
        let verdict = yield_verdict(incoming.as_ref(), &local);
        tracing::debug!(
            account = %local.account,
            incoming = incoming.as_ref().map(|c| c.tab_id.as_str()).unwrap_or(""),
            ?verdict,
            "claim update"
        );
        let Some(winner) = incoming.filter(|_| verdict.is_yield()) else {
            continue;
        };
        if !state.begin_close() {
            continue;
        }

        tracing::info!(
            account = %local.account,
            tab_id = %local.tab_id,
            winner = %winner.tab_id,
            winner_client = %winner.client_id,
            "yielding session to newer claim"
        );
        heartbeat.cancel();
        subscription.off();
        handler.on_conflict(&winner).await;
        displaced.cancel();
        return;
    }
}
