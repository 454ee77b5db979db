//! Session identity scheme.
//!
//! A tab id is `{client_id}_{acquire_ts}_{rand}`. The client id may itself
//! contain underscores, so the timestamp is always recovered from the right.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::types::Millis;

const SUFFIX_LEN: usize = 8;

/// Generate a fresh physical-client id: `cli_<ulid>`.
pub fn new_client_id() -> String {
    format!("cli_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Build a tab id for a session acquired at `acquire_ts`.
pub fn tab_id(client_id: &str, acquire_ts: Millis) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{client_id}_{acquire_ts}_{suffix}")
}

/// Recover the coarse acquisition timestamp encoded in a tab id.
pub fn tab_id_timestamp(tab_id: &str) -> Option<Millis> {
    let mut parts = tab_id.rsplitn(3, '_');
    let _suffix = parts.next()?;
    let ts = parts.next()?;
    let _client = parts.next()?;
    ts.parse().ok()
}
