use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tenure_core::{is_live_foreign_claim, Millis, SessionClaim};

use crate::setup;

/// Execute `tenure status <account>`
pub fn execute(account: &str, store: Option<&Path>, json: bool) -> Result<()> {
    let ctx = setup::open_context(store)?;
    let rt = tokio::runtime::Runtime::new()?;
    let claim = rt.block_on(ctx.peek_claim(account))?;

    if json {
        let value = claim
            .as_ref()
            .map(SessionClaim::to_value)
            .unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match claim {
        Some(c) if !c.is_vacant() => print!(
            "{}",
            report(
                account,
                &c,
                ctx.client_id(),
                ctx.clock().now_ms(),
                ctx.config().freshness_window
            )
        ),
        _ => println!("{account}: no session"),
    }
    Ok(())
}

fn report(
    account: &str,
    claim: &SessionClaim,
    client_id: &str,
    now: Millis,
    window: Duration,
) -> String {
    let ours = claim.client_id == client_id;
    let beat = claim.heartbeat.filter(|b| *b > 0);
    let state = if is_live_foreign_claim(Some(claim), client_id, now, window) {
        "active on another client"
    } else if ours && beat.is_some_and(|b| now.saturating_sub(b) < window.as_millis() as Millis) {
        "active"
    } else if beat.is_some() {
        "stale"
    } else {
        "no heartbeat"
    };

    let mut out = String::new();
    let _ = writeln!(out, "{account}: {state}");
    let _ = writeln!(
        out,
        "  client:   {}{}",
        claim.client_id,
        if ours { " (this client)" } else { "" }
    );
    let _ = writeln!(out, "  session:  {}", claim.tab_id);
    if let Some(started) = claim.session_started_at.filter(|s| *s > 0) {
        let _ = writeln!(out, "  started:  {}", setup::format_ms(started));
    }
    if let Some(beat) = beat {
        let _ = writeln!(out, "  last beat: {}", setup::format_age(now.saturating_sub(beat)));
    }
    out
}
