use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tenure_session::{NoticeOnConflict, ReleaseOutcome, SessionContext};
use tokio_util::sync::CancellationToken;

use crate::setup;

/// Execute `tenure login <account>`
pub fn execute(account: &str, store: Option<&Path>, no_takeover: bool) -> Result<()> {
    let ctx = setup::open_context(store)?;

    if let Some(notice) = ctx.take_notice() {
        println!("{}: {}", notice.title, notice.message);
    }

    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(&ctx, account, no_takeover, cancel))
}

async fn run(
    ctx: &SessionContext,
    account: &str,
    no_takeover: bool,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(holder) = ctx.live_foreign_claim(account).await? {
        if no_takeover {
            bail!(
                "account {account} is active on client {} (started {})",
                holder.client_id,
                holder
                    .session_started_at
                    .map(setup::format_ms)
                    .unwrap_or_else(|| "unknown".into())
            );
        }
        tracing::info!(client = %holder.client_id, "taking over session from another client");
    }

    let handler = Arc::new(NoticeOnConflict::new(ctx.notices().clone(), ctx.clock()));
    let session = ctx.login(account, handler).await?;
    println!("Signed in as {account} (session {})", session.tab_id());
    println!("  Press Ctrl-C to sign out.");

    let displaced = tokio::select! {
        _ = session.closed() => true,
        _ = cancel.cancelled() => false,
    };

    let outcome = session.logout().await?;
    tracing::debug!(?outcome, "session released");

    if displaced {
        bail!("signed in on another client; run `tenure notice` for details");
    }
    match outcome {
        ReleaseOutcome::Cleared => println!("Signed out."),
        ReleaseOutcome::HeldByOther => println!("Signed out (another client holds the session)."),
        ReleaseOutcome::Absent => println!("Signed out (no session found)."),
    }
    Ok(())
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
