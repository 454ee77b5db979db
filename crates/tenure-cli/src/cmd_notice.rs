use std::sync::Arc;

use anyhow::Result;
use tenure_core::{Clock, SessionConfig, SystemClock};
use tenure_session::NoticeHandoff;

use crate::setup;

/// Execute `tenure notice [--keep]`
pub fn execute(keep: bool) -> Result<()> {
    let config = setup::load_config()?;
    let notices = NoticeHandoff::new(Arc::new(setup::open_local()));
    show(&notices, &SystemClock, &config, keep);
    Ok(())
}

fn show(notices: &NoticeHandoff, clock: &dyn Clock, config: &SessionConfig, keep: bool) {
    let now = clock.now_ms();
    let notice = if keep {
        notices.load(now, config.notice_ttl)
    } else {
        notices.take(now, config.notice_ttl)
    };
    match notice {
        Some(n) => {
            println!("{}", n.title);
            println!("  {}", n.message);
            if let Some(created) = n.created_at {
                println!("  at {} ({})", setup::format_ms(created), setup::format_age(now - created));
            }
        }
        None => println!("(no notice)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_core::{ManualClock, SessionClaim, SessionNotice};
    use tenure_store::MemoryLocalStore;

    fn pending() -> NoticeHandoff {
        let notices = NoticeHandoff::new(Arc::new(MemoryLocalStore::new()));
        let winner = SessionClaim {
            tab_id: "Y_2000_b".into(),
            heartbeat: Some(2_100),
            client_id: "Y".into(),
            account: "alice".into(),
            session_started_at: Some(2_000),
        };
        notices.save(&SessionNotice::conflict(&winner, 3_000));
        notices
    }

    #[test]
    fn keep_leaves_notice_in_place() {
        let notices = pending();
        let clock = ManualClock::new(4_000);
        let config = SessionConfig::default();
        show(&notices, &clock, &config, true);
        assert!(notices.load(4_000, config.notice_ttl).is_some());
        show(&notices, &clock, &config, false);
        assert!(notices.load(4_000, config.notice_ttl).is_none());
    }
}
