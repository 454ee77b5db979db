use std::sync::{Arc, Mutex};

use tenure_core::{Clock, SessionClaim, SessionNotice};

use crate::notice::NoticeHandoff;

/// Upward callback for a lost arbitration. Called exactly once per session.
#[async_trait::async_trait]
pub trait ConflictHandler: Send + Sync {
    async fn on_conflict(&self, winner: &SessionClaim);
}

/// Persists a conflict notice for the next boot, then delegates.
pub struct NoticeOnConflict {
    notices: NoticeHandoff,
    clock: Arc<dyn Clock>,
    next: Option<Arc<dyn ConflictHandler>>,
}

impl NoticeOnConflict {
    pub fn new(notices: NoticeHandoff, clock: Arc<dyn Clock>) -> Self {
        Self {
            notices,
            clock,
            next: None,
        }
    }

    pub fn then(mut self, next: Arc<dyn ConflictHandler>) -> Self {
        self.next = Some(next);
        self
    }
}

#[async_trait::async_trait]
impl ConflictHandler for NoticeOnConflict {
    async fn on_conflict(&self, winner: &SessionClaim) {
        let notice = SessionNotice::conflict(winner, self.clock.now_ms());
        self.notices.save(&notice);
        if let Some(next) = &self.next {
            next.on_conflict(winner).await;
        }
    }
}

/// Collects winning claims in memory (for testing).
#[derive(Default)]
pub struct CollectHandler {
    claims: Mutex<Vec<SessionClaim>>,
}

impl CollectHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claims(&self) -> Vec<SessionClaim> {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl ConflictHandler for CollectHandler {
    async fn on_conflict(&self, winner: &SessionClaim) {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(winner.clone());
    }
}
