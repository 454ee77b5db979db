use clap::Subcommand;
use std::path::Path;

use tenure_core::SessionConfig;

use crate::setup::{config_path, read_config};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. heartbeat_ms)
        key: String,
        /// Config value (number, or a JSON array for burst_ms)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// Remove a config value
    Unset {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

const KNOWN_KEYS: &[&str] = &[
    "freshness_ms",
    "heartbeat_ms",
    "burst_ms",
    "notice_ttl_ms",
    "poll_ms",
];

// ── Dispatch ──

pub fn run(cmd: ConfigCmd) -> anyhow::Result<()> {
    let path = config_path();
    match cmd {
        ConfigCmd::Set { key, value } => set(&path, &key, &value),
        ConfigCmd::Get { key } => get(&path, &key),
        ConfigCmd::Unset { key } => unset(&path, &key),
        ConfigCmd::List => list(&path),
    }
}

// ── Command Implementations ──

fn write_config(
    path: &Path,
    config: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&config)?;
    tenure_store::write_atomic(path, json.as_bytes())?;
    Ok(())
}

/// Parse a string value into an appropriate JSON value (number/array/bool/string).
fn parse_value(s: &str) -> serde_json::Value {
    let s = s.trim();
    if s.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(s) {
            return v;
        }
    }
    match s {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                serde_json::Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                serde_json::Value::String(s.to_string())
            }
        }
    }
}

/// `tenure config set <key> <value>`
fn set(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        anyhow::bail!("unknown config key `{key}` (known: {})", KNOWN_KEYS.join(", "));
    }
    let mut config = read_config(path)?;
    config.insert(key.to_string(), parse_value(value));
    // Refuse to persist a combination the protocol cannot run with.
    SessionConfig::default().apply_json(&config)?;
    write_config(path, &config)?;
    println!("{key} = {value}");
    Ok(())
}

/// `tenure config get <key>`
fn get(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = read_config(path)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `tenure config unset <key>`
fn unset(path: &Path, key: &str) -> anyhow::Result<()> {
    let mut config = read_config(path)?;
    if config.remove(key).is_none() {
        println!("(not set)");
        return Ok(());
    }
    write_config(path, &config)?;
    println!("{key} unset");
    Ok(())
}

/// `tenure config list`
fn list(path: &Path) -> anyhow::Result<()> {
    let config = read_config(path)?;
    if config.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &config {
            println!("{k} = {v}");
        }
    }
    Ok(())
}
