use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tenure_core::{SessionConfig, SystemClock};
use tenure_session::SessionContext;
use tenure_store::{DirStore, FileLocalStore};

/// `<store root>/config.json`
pub fn config_path() -> PathBuf {
    tenure_store::store_root().join("config.json")
}

/// Read config from `config.json`. Returns empty map if file doesn't exist.
pub fn read_config(path: &Path) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    if !path.exists() {
        return Ok(serde_json::Map::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let val: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    match val {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(serde_json::Map::new()),
    }
}

/// Defaults, then `config.json`, then `TENURE_*` env vars.
pub fn load_config() -> anyhow::Result<SessionConfig> {
    let path = config_path();
    let map = read_config(&path)?;
    let config = SessionConfig::default()
        .apply_json(&map)
        .with_context(|| format!("invalid config: {}", path.display()))?
        .apply_env()
        .validate()?;
    Ok(config)
}

pub fn open_local() -> FileLocalStore {
    FileLocalStore::new(tenure_store::store_root().join("local"))
}

pub fn open_context(store: Option<&Path>) -> anyhow::Result<SessionContext> {
    let config = load_config()?;
    let shared_dir = store
        .map(Path::to_path_buf)
        .unwrap_or_else(|| tenure_store::store_root().join("shared"));
    let shared = DirStore::new(shared_dir, config.poll_interval);
    let ctx = SessionContext::new(
        Arc::new(shared),
        Arc::new(open_local()),
        Arc::new(SystemClock),
        config,
    )?;
    Ok(ctx)
}

/// Format epoch milliseconds as RFC3339 (falls back to the raw number).
pub fn format_ms(ms: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

/// Format age in human-readable form.
pub fn format_age(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_config_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_config(&tmp.path().join("config.json")).unwrap().is_empty());
    }

    #[test]
    fn read_config_non_object_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(read_config(&path).unwrap().is_empty());
    }

    #[test]
    fn format_age_display() {
        assert_eq!(format_age(4_999), "4s ago");
        assert_eq!(format_age(125_000), "2m ago");
        assert_eq!(format_age(7_300_000), "2h ago");
        assert_eq!(format_age(-50), "0s ago");
    }

    #[test]
    fn format_ms_rfc3339() {
        assert_eq!(format_ms(0), "1970-01-01T00:00:00Z");
        assert!(format_ms(1_700_000_000_123).starts_with("2023-11-14T22:13:20.123"));
    }
}
