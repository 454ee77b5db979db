use std::time::Duration;

// ── Defaults ──

pub const DEFAULT_FRESHNESS_MS: u64 = 10_000;
pub const DEFAULT_HEARTBEAT_MS: u64 = 2_000;
pub const DEFAULT_BURST_MS: [u64; 2] = [150, 600];
pub const DEFAULT_NOTICE_TTL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_POLL_MS: u64 = 250;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Host-tunable protocol timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum heartbeat age that still confers ownership.
    pub freshness_window: Duration,
    pub heartbeat_interval: Duration,
    /// Extra claim writes right after acquisition, offsets from acquisition.
    pub burst_delays: Vec<Duration>,
    pub notice_ttl: Duration,
    /// Change-detection interval for polling stores.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_millis(DEFAULT_FRESHNESS_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            burst_delays: DEFAULT_BURST_MS.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            notice_ttl: Duration::from_millis(DEFAULT_NOTICE_TTL_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

impl SessionConfig {
    /// Overlay values from a `config.json` object. Unknown keys are ignored.
    ///
    /// Keys: `freshness_ms`, `heartbeat_ms`, `burst_ms` (array), `notice_ttl_ms`, `poll_ms`.
    pub fn apply_json(
        mut self,
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = map.get("freshness_ms") {
            self.freshness_window = json_millis("freshness_ms", v)?;
        }
        if let Some(v) = map.get("heartbeat_ms") {
            self.heartbeat_interval = json_millis("heartbeat_ms", v)?;
        }
        if let Some(v) = map.get("burst_ms") {
            let items = v.as_array().ok_or_else(|| invalid("burst_ms", "expected an array"))?;
            self.burst_delays = items
                .iter()
                .map(|item| json_millis("burst_ms", item))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = map.get("notice_ttl_ms") {
            self.notice_ttl = json_millis("notice_ttl_ms", v)?;
        }
        if let Some(v) = map.get("poll_ms") {
            self.poll_interval = json_millis("poll_ms", v)?;
        }
        self.validate()
    }

    /// Overlay `TENURE_*` environment variables. Unparseable values are ignored.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        if let Some(d) = millis("TENURE_FRESHNESS_MS") {
            self.freshness_window = d;
        }
        if let Some(d) = millis("TENURE_HEARTBEAT_MS").filter(|d| !d.is_zero()) {
            self.heartbeat_interval = d;
        }
        if let Some(d) = millis("TENURE_NOTICE_TTL_MS") {
            self.notice_ttl = d;
        }
        if let Some(d) = millis("TENURE_POLL_MS").filter(|d| !d.is_zero()) {
            self.poll_interval = d;
        }
        if let Some(raw) = lookup("TENURE_BURST_MS") {
            let parsed: Option<Vec<Duration>> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u64>().ok().map(Duration::from_millis))
                .collect();
            if let Some(delays) = parsed {
                self.burst_delays = delays;
            }
        }
        self
    }

    /// Reject timings the protocol cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_ms", "must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_ms", "must be positive"));
        }
        if self.freshness_window <= self.heartbeat_interval {
            return Err(invalid(
                "freshness_ms",
                "must exceed the heartbeat interval",
            ));
        }
        Ok(self)
    }
}

fn json_millis(key: &str, v: &serde_json::Value) -> Result<Duration, ConfigError> {
    v.as_u64()
        .map(Duration::from_millis)
        .ok_or_else(|| invalid(key, "expected a non-negative integer (ms)"))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
