//! Session context: the explicitly constructed owner of stores, clock,
//! config, and client identity for one client process.

use std::sync::Arc;

use tenure_core::identity;
use tenure_core::{
    claim_key, is_live_foreign_claim, Clock, MonotonicStamper, SessionClaim, SessionConfig,
    SessionNotice, CLIENT_ID_SLOT,
};
use tenure_store::{LocalStore, SharedStore};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::handler::ConflictHandler;
use crate::listener::{ConflictListener, SessionPhase, SessionState};
use crate::notice::NoticeHandoff;
use crate::writer::{ClaimWriter, ReleaseOutcome};

pub struct SessionContext {
    shared: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    stamper: MonotonicStamper,
    config: SessionConfig,
    client_id: String,
    notices: NoticeHandoff,
}

impl SessionContext {
    /// Build a context, loading (or creating and persisting) the client id.
    pub fn new(
        shared: Arc<dyn SharedStore>,
        local: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let config = config.validate()?;
        let client_id = load_or_create_client_id(local.as_ref());
        Ok(Self {
            shared,
            stamper: MonotonicStamper::new(clock.clone()),
            clock,
            config,
            client_id,
            notices: NoticeHandoff::new(local),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn notices(&self) -> &NoticeHandoff {
        &self.notices
    }

    /// One-shot read of the account's current claim.
    pub async fn peek_claim(&self, account: &str) -> Result<Option<SessionClaim>, SessionError> {
        let value = self.shared.once(&claim_key(account)).await?;
        Ok(value.as_ref().and_then(SessionClaim::decode))
    }

    /// The account's current claim if it is live and held by another client.
    pub async fn live_foreign_claim(
        &self,
        account: &str,
    ) -> Result<Option<SessionClaim>, SessionError> {
        let claim = self.peek_claim(account).await?;
        let live = is_live_foreign_claim(
            claim.as_ref(),
            &self.client_id,
            self.clock.now_ms(),
            self.config.freshness_window,
        );
        Ok(claim.filter(|_| live))
    }

    /// Acquire the account's session slot and start arbitration.
    ///
    /// Subscribes before publishing the first claim, so a competing claim
    /// written during acquisition is still observed.
    pub async fn login(
        &self,
        account: &str,
        handler: Arc<dyn ConflictHandler>,
    ) -> Result<ActiveSession, SessionError> {
        let subscription = self.shared.subscribe(&claim_key(account))?;
        let writer = ClaimWriter::acquire(
            self.shared.clone(),
            self.clock.clone(),
            &self.stamper,
            account,
            &self.client_id,
            &self.config,
        )
        .await?;

        let state = Arc::new(SessionState::new());
        let listener = ConflictListener::spawn(
            subscription,
            writer.local_session(),
            state.clone(),
            writer.heartbeat_token(),
            handler,
        );
        Ok(ActiveSession {
            claim: writer.claim().clone(),
            displaced: listener.displaced(),
            state,
            writer: Some(writer),
            listener: Some(listener),
        })
    }

    /// Boot-time read-once of the pending notice.
    pub fn take_notice(&self) -> Option<SessionNotice> {
        self.notices
            .take(self.clock.now_ms(), self.config.notice_ttl)
    }
}

/// Read the persisted client id, or create and persist a new one.
///
/// If local storage is unavailable the id lives only as long as the process.
pub fn load_or_create_client_id(local: &dyn LocalStore) -> String {
    match local.get(CLIENT_ID_SLOT) {
        Ok(Some(id)) if !id.trim().is_empty() => return id.trim().to_string(),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "cannot read client id"),
    }
    let id = identity::new_client_id();
    if let Err(e) = local.set(CLIENT_ID_SLOT, &id) {
        tracing::warn!(error = %e, "cannot persist client id; using an ephemeral one");
    }
    id
}

/// A logged-in session.
pub struct ActiveSession {
    claim: SessionClaim,
    state: Arc<SessionState>,
    displaced: CancellationToken,
    writer: Option<ClaimWriter>,
    listener: Option<ConflictListener>,
}

impl ActiveSession {
    pub fn claim(&self) -> &SessionClaim {
        &self.claim
    }

    pub fn tab_id(&self) -> &str {
        &self.claim.tab_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Resolves once another session has won and the handler has run.
    pub async fn closed(&self) {
        self.displaced.cancelled().await;
    }

    /// Log out: stop listening and heartbeating, then guarded-clear the claim.
    pub async fn logout(mut self) -> Result<ReleaseOutcome, SessionError> {
        self.state.mark_logged_out();
        if let Some(writer) = &self.writer {
            writer.stop();
        }
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        match self.writer.take() {
            Some(writer) => writer.release().await,
            None => Ok(ReleaseOutcome::Absent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CollectHandler, NoticeOnConflict};
    use std::time::Duration;
    use tenure_core::ManualClock;
    use tenure_store::{MemoryLocalStore, MemoryStore};

    const WAIT: Duration = Duration::from_secs(30);

    struct Client {
        ctx: SessionContext,
        clock: Arc<ManualClock>,
        local: Arc<MemoryLocalStore>,
    }

    fn client(shared: &MemoryStore, client_id: &str, now: i64) -> Client {
        let local = Arc::new(MemoryLocalStore::new());
        local.set(CLIENT_ID_SLOT, client_id).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let ctx = SessionContext::new(
            Arc::new(shared.clone()),
            local.clone(),
            clock.clone(),
            SessionConfig::default(),
        )
        .unwrap();
        Client { ctx, clock, local }
    }

    #[test]
    fn client_id_is_created_once_and_reused() {
        let local = MemoryLocalStore::new();
        let first = load_or_create_client_id(&local);
        assert!(first.starts_with("cli_"));
        assert_eq!(load_or_create_client_id(&local), first);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SessionConfig {
            freshness_window: Duration::from_millis(100),
            ..SessionConfig::default()
        };
        let result = SessionContext::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(ManualClock::new(0)),
            config,
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_login_displaces_older_session() {
        let shared = MemoryStore::new();
        let a = client(&shared, "X", 1_000);
        let b = client(&shared, "Y", 2_000);

        let a_handler = Arc::new(
            NoticeOnConflict::new(a.ctx.notices().clone(), a.ctx.clock())
                .then(Arc::new(CollectHandler::new())),
        );
        let a_session = a.ctx.login("alice", a_handler).await.unwrap();
        assert_eq!(a.ctx.live_foreign_claim("alice").await.unwrap(), None);

        let b_collect = Arc::new(CollectHandler::new());
        let b_session = b.ctx.login("alice", b_collect.clone()).await.unwrap();

        tokio::time::timeout(WAIT, a_session.closed()).await.unwrap();
        assert_eq!(a_session.phase(), SessionPhase::Closing);
        assert!(b_session.is_active());

        // B keeps beating; A stays silent.
        b.clock.set(6_000);
        tokio::time::sleep(Duration::from_millis(4_100)).await;
        let stored = a.ctx.peek_claim("alice").await.unwrap().unwrap();
        assert_eq!(stored.tab_id, b_session.tab_id());
        assert_eq!(stored.heartbeat, Some(6_000));
        assert!(b_collect.claims().is_empty());

        // The displaced client's guarded clear leaves B's claim alone.
        assert_eq!(a_session.logout().await.unwrap(), ReleaseOutcome::HeldByOther);
        assert_eq!(
            a.ctx.peek_claim("alice").await.unwrap().unwrap().tab_id,
            b_session.tab_id()
        );

        // Next boot of A shows the notice once.
        a.clock.set(7_000);
        let notice = a.ctx.take_notice().unwrap();
        assert!(notice.message.contains("(Y)"));
        assert_eq!(a.ctx.take_notice(), None);
        assert!(a.local.get(tenure_core::NOTICE_SLOT).unwrap().is_none());

        assert_eq!(b_session.logout().await.unwrap(), ReleaseOutcome::Cleared);
        assert!(b.ctx.peek_claim("alice").await.unwrap().unwrap().is_vacant());
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_logins_leave_exactly_one_survivor() {
        let shared = MemoryStore::new().with_duplicate_delivery(true);
        let a = client(&shared, "client_1_a", 6_000);
        let b = client(&shared, "client_1_b", 6_000);

        let a_session = a.ctx.login("alice", Arc::new(CollectHandler::new())).await.unwrap();
        let b_session = b.ctx.login("alice", Arc::new(CollectHandler::new())).await.unwrap();
        assert_eq!(a_session.claim().session_started_at, Some(6_000));
        assert_eq!(b_session.claim().session_started_at, Some(6_000));

        // Let bursts and a heartbeat interleave.
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let (winner, loser) = if a_session.tab_id() > b_session.tab_id() {
            (&a_session, &b_session)
        } else {
            (&b_session, &a_session)
        };
        assert!(winner.is_active());
        assert_eq!(loser.phase(), SessionPhase::Closing);
        let stored = a.ctx.peek_claim("alice").await.unwrap().unwrap();
        assert_eq!(stored.tab_id, winner.tab_id());
    }

    #[tokio::test(start_paused = true)]
    async fn reload_of_same_client_does_not_displace() {
        let shared = MemoryStore::new();
        let first = client(&shared, "X", 1_000);
        let collect = Arc::new(CollectHandler::new());
        let old = first.ctx.login("alice", collect.clone()).await.unwrap();

        let reloaded = client(&shared, "X", 2_000);
        let new = reloaded
            .ctx
            .login("alice", Arc::new(CollectHandler::new()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert!(old.is_active());
        assert!(new.is_active());
        assert!(collect.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn live_foreign_claim_reports_other_client_until_stale() {
        let shared = MemoryStore::new();
        let a = client(&shared, "X", 1_000);
        let b = client(&shared, "Y", 1_500);

        let session = a.ctx.login("alice", Arc::new(CollectHandler::new())).await.unwrap();
        session.logout().await.unwrap();
        assert_eq!(b.ctx.live_foreign_claim("alice").await.unwrap(), None);

        let session = a.ctx.login("alice", Arc::new(CollectHandler::new())).await.unwrap();
        let seen = b.ctx.live_foreign_claim("alice").await.unwrap().unwrap();
        assert_eq!(seen.tab_id, session.tab_id());

        // A stops beating (crash without logout); B's view goes stale.
        drop(session);
        b.clock.set(1_500 + 10_000);
        assert_eq!(b.ctx.live_foreign_claim("alice").await.unwrap(), None);
    }
}
