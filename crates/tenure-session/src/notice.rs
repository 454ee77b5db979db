//! Notice handoff: tells a displaced client, after its next boot, why its
//! session was closed.
//!
//! Lives in the local persisted store, never the shared one. Every storage
//! failure degrades to "no notice".

use std::sync::Arc;
use std::time::Duration;

use tenure_core::{Millis, SessionNotice, NOTICE_SLOT};
use tenure_store::LocalStore;

#[derive(Clone)]
pub struct NoticeHandoff {
    store: Arc<dyn LocalStore>,
}

impl NoticeHandoff {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Persist `notice` in the single slot, replacing any previous one.
    pub fn save(&self, notice: &SessionNotice) {
        let data = match serde_json::to_string(notice) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialize session notice");
                return;
            }
        };
        if let Err(e) = self.store.set(NOTICE_SLOT, &data) {
            tracing::warn!(error = %e, "cannot persist session notice");
        }
    }

    /// Read the pending notice, if any and not older than `ttl`.
    ///
    /// Corrupt, undated, and expired notices are removed as a side effect.
    /// A valid notice stays in place; clearing it is the caller's call.
    pub fn load(&self, now: Millis, ttl: Duration) -> Option<SessionNotice> {
        let raw = match self.store.get(NOTICE_SLOT) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read session notice");
                return None;
            }
        };
        let notice: SessionNotice = match serde_json::from_str(&raw) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "discarding malformed session notice");
                self.clear();
                return None;
            }
        };
        let created_at = match notice.created_at {
            Some(ts) if ts > 0 => ts,
            _ => {
                self.clear();
                return None;
            }
        };
        let ttl_ms = ttl.as_millis().min(Millis::MAX as u128) as Millis;
        if now.saturating_sub(created_at) > ttl_ms {
            tracing::debug!(id = %notice.id, "discarding expired session notice");
            self.clear();
            return None;
        }
        Some(notice)
    }

    /// Remove the slot unconditionally.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(NOTICE_SLOT) {
            tracing::warn!(error = %e, "cannot clear session notice");
        }
    }

    /// One-shot read: `load`, then clear if something was returned.
    pub fn take(&self, now: Millis, ttl: Duration) -> Option<SessionNotice> {
        let notice = self.load(now, ttl)?;
        self.clear();
        Some(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_core::{NoticeKind, SessionClaim};
    use tenure_store::{FileLocalStore, MemoryLocalStore, StoreError};

    const TTL: Duration = Duration::from_secs(300);

    /// Local storage that is disabled (quota, private mode).
    struct Unavailable;

    impl LocalStore for Unavailable {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unsupported("local storage"))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unsupported("local storage"))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unsupported("local storage"))
        }
    }

    fn notice(created_at: Option<Millis>) -> SessionNotice {
        SessionNotice {
            id: "ntc_1".into(),
            kind: NoticeKind::Conflict,
            title: "Signed out".into(),
            message: "Signed in elsewhere".into(),
            created_at,
        }
    }

    fn handoff() -> (Arc<MemoryLocalStore>, NoticeHandoff) {
        let store = Arc::new(MemoryLocalStore::new());
        (store.clone(), NoticeHandoff::new(store))
    }

    #[test]
    fn save_then_load_within_ttl() {
        let (store, h) = handoff();
        let n = notice(Some(10_000));
        h.save(&n);
        assert_eq!(h.load(10_000 + 299_000, TTL), Some(n.clone()));
        // Loading does not consume it.
        assert_eq!(h.load(10_000 + 299_000, TTL), Some(n));
        assert!(store.get(NOTICE_SLOT).unwrap().is_some());
    }

    #[test]
    fn expired_notice_is_cleared() {
        let (store, h) = handoff();
        h.save(&notice(Some(10_000)));
        assert_eq!(h.load(10_000 + 300_001, TTL), None);
        assert_eq!(store.get(NOTICE_SLOT).unwrap(), None);
        assert_eq!(h.load(10_000, TTL), None);
    }

    #[test]
    fn load_after_clear_is_empty_twice() {
        let (_store, h) = handoff();
        h.save(&notice(Some(10_000)));
        h.clear();
        assert_eq!(h.load(10_000, TTL), None);
        assert_eq!(h.load(10_000, TTL), None);
    }

    #[test]
    fn undated_notice_is_cleared() {
        for created in [None, Some(0), Some(-5)] {
            let (store, h) = handoff();
            h.save(&notice(created));
            assert_eq!(h.load(10_000, TTL), None);
            assert_eq!(store.get(NOTICE_SLOT).unwrap(), None);
        }
    }

    #[test]
    fn malformed_slot_is_cleared() {
        let (store, h) = handoff();
        store.set(NOTICE_SLOT, "{not json").unwrap();
        assert_eq!(h.load(10_000, TTL), None);
        assert_eq!(store.get(NOTICE_SLOT).unwrap(), None);
    }

    #[test]
    fn take_is_one_shot() {
        let (_store, h) = handoff();
        let n = notice(Some(10_000));
        h.save(&n);
        assert_eq!(h.take(10_500, TTL), Some(n));
        assert_eq!(h.take(10_500, TTL), None);
    }

    #[test]
    fn unavailable_storage_is_a_no_op() {
        let h = NoticeHandoff::new(Arc::new(Unavailable));
        h.save(&notice(Some(10_000)));
        assert_eq!(h.load(10_000, TTL), None);
        h.clear();
        assert_eq!(h.take(10_000, TTL), None);
    }

    #[test]
    fn survives_reload_through_file_store() {
        let tmp = tempfile::tempdir().unwrap();
        let winner = SessionClaim {
            tab_id: "Y_2000_b".into(),
            heartbeat: Some(2100),
            client_id: "Y".into(),
            account: "alice".into(),
            session_started_at: Some(2000),
        };
        let n = SessionNotice::conflict(&winner, 5_000);
        NoticeHandoff::new(Arc::new(FileLocalStore::new(tmp.path()))).save(&n);

        // A fresh process over the same directory.
        let rebooted = NoticeHandoff::new(Arc::new(FileLocalStore::new(tmp.path())));
        assert_eq!(rebooted.take(6_000, TTL), Some(n));
        assert_eq!(rebooted.load(6_000, TTL), None);
    }
}
