use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Unix epoch milliseconds.
pub type Millis = i64;

/// Shared-store key holding the single claim for an account.
/// Layout: `accounts/{account}/session`
pub fn claim_key(account: &str) -> String {
    format!("accounts/{account}/session")
}

/// Local-store slot for the pending session notice.
pub const NOTICE_SLOT: &str = "notice.session";

/// Local-store slot for the persisted physical client id.
pub const CLIENT_ID_SLOT: &str = "client.id";

// ── Session Claim ──

/// The record asserting a session's ownership of an account.
///
/// One value per account, overwritten by every heartbeat. Decoding is lenient:
/// missing fields and non-numeric timestamps decode as absent so that partial
/// or foreign-format records never abort arbitration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaim {
    #[serde(default, deserialize_with = "lenient_string")]
    pub tab_id: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub heartbeat: Option<Millis>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub client_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub account: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub session_started_at: Option<Millis>,
}

impl SessionClaim {
    /// Decode a store value. Anything that is not a JSON object is no claim.
    pub fn decode(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Encode to the wire form written into the shared store.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "tabId": self.tab_id,
            "heartbeat": self.heartbeat,
            "clientId": self.client_id,
            "account": self.account,
            "sessionStartedAt": self.session_started_at,
        })
    }

    /// The value a guarded clear leaves behind. Carries no authority.
    pub fn zeroed(account: &str) -> Self {
        Self {
            tab_id: String::new(),
            heartbeat: Some(0),
            client_id: String::new(),
            account: account.to_string(),
            session_started_at: Some(0),
        }
    }

    /// True for zeroed or tab-less records.
    pub fn is_vacant(&self) -> bool {
        self.tab_id.is_empty()
    }

    /// Copy of this claim with a fresh heartbeat stamp.
    pub fn beat(&self, now: Millis) -> Self {
        Self {
            heartbeat: Some(now),
            ..self.clone()
        }
    }
}

// ── Session Notice ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Conflict,
}

/// Human-readable explanation of why a session was closed, shown once after
/// the next boot of the displaced client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub created_at: Option<Millis>,
}

impl SessionNotice {
    /// Standard notice for a session displaced by `winner`.
    pub fn conflict(winner: &SessionClaim, now: Millis) -> Self {
        let origin = if winner.client_id.is_empty() {
            "another client".to_string()
        } else {
            format!("another client ({})", winner.client_id)
        };
        Self {
            id: format!("ntc_{}", ulid::Ulid::new().to_string().to_lowercase()),
            kind: NoticeKind::Conflict,
            title: "Signed out".to_string(),
            message: format!(
                "Account {} was signed in on {origin}. This session was closed.",
                winner.account
            ),
            created_at: Some(now),
        }
    }
}

// ── Lenient decoding ──

fn lenient_millis<'de, D>(de: D) -> Result<Option<Millis>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    })
}

fn lenient_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::String(s) => s,
        _ => String::new(),
    })
}
