//! Ownership arbitration.
//!
//! Pure predicates evaluated independently on every observed claim update.
//! They hold no state beyond the caller-supplied local session, so any
//! delivery order or duplication of updates yields the same decisions.

use std::cmp::Ordering;
use std::time::Duration;

use crate::identity::tab_id_timestamp;
use crate::types::{Millis, SessionClaim};

/// The local session's side of an arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    pub account: String,
    pub client_id: String,
    pub tab_id: String,
    pub session_started_at: Millis,
}

/// Outcome of evaluating one incoming claim against the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No claim, or a claim without a tab id.
    Absent,
    /// Our own write echoed back.
    Echo,
    OtherAccount,
    /// Same physical client (reload or reconnect).
    SameClient,
    /// Heartbeat missing or older than our own session start.
    Predates,
    /// No usable start time in either field.
    Malformed,
    /// Incoming session started earlier; we keep ownership.
    Older,
    /// Incoming session started later; we yield.
    Newer,
    /// Same start time, tab id tie-break. `yield_` is true if we lose.
    Tie { yield_: bool },
}

impl Verdict {
    pub fn is_yield(self) -> bool {
        matches!(self, Verdict::Newer | Verdict::Tie { yield_: true })
    }
}

/// Whether `claim` is a live claim held by a different physical client.
pub fn is_live_foreign_claim(
    claim: Option<&SessionClaim>,
    local_client_id: &str,
    now: Millis,
    freshness_window: Duration,
) -> bool {
    let Some(claim) = claim else {
        return false;
    };
    let heartbeat = match claim.heartbeat {
        Some(hb) if hb > 0 => hb,
        _ => return false,
    };
    let window = freshness_window.as_millis().min(Millis::MAX as u128) as Millis;
    if now.saturating_sub(heartbeat) >= window {
        return false;
    }
    claim.client_id != local_client_id
}

/// Whether the local session must yield to `incoming`.
pub fn should_yield(incoming: Option<&SessionClaim>, local: &LocalSession) -> bool {
    yield_verdict(incoming, local).is_yield()
}

/// Full arbitration verdict for `incoming`, including the reason for ignoring it.
pub fn yield_verdict(incoming: Option<&SessionClaim>, local: &LocalSession) -> Verdict {
    let Some(claim) = incoming else {
        return Verdict::Absent;
    };
    if claim.tab_id.is_empty() {
        return Verdict::Absent;
    }
    if claim.tab_id == local.tab_id {
        return Verdict::Echo;
    }
    if claim.account != local.account {
        return Verdict::OtherAccount;
    }
    if claim.client_id == local.client_id {
        return Verdict::SameClient;
    }
    match claim.heartbeat {
        Some(hb) if hb > 0 && hb >= local.session_started_at => {}
        _ => return Verdict::Predates,
    }

    let Some(incoming_start) = logical_start(claim) else {
        return Verdict::Malformed;
    };
    match incoming_start.cmp(&local.session_started_at) {
        Ordering::Greater => Verdict::Newer,
        Ordering::Less => Verdict::Older,
        Ordering::Equal => Verdict::Tie {
            yield_: claim.tab_id.as_str() > local.tab_id.as_str(),
        },
    }
}

/// `sessionStartedAt` when present and positive, else the tab id timestamp.
fn logical_start(claim: &SessionClaim) -> Option<Millis> {
    match claim.session_started_at {
        Some(ts) if ts > 0 => Some(ts),
        _ => tab_id_timestamp(&claim.tab_id),
    }
}
