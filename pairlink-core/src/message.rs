//! Stored chat messages and the decrypted payload codec.

use serde::Serialize;
use uuid::Uuid;

/// One persisted chat message. `sent` tracks outbound delivery only:
/// received messages are created with `sent = false` and stay that way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub from: String,
    pub body: String,
    /// Unix milliseconds.
    pub date: i64,
    pub self_authored: bool,
    pub sent: bool,
}

impl StoredMessage {
    /// A locally composed message, queued for the outbox.
    pub fn outgoing(from: &str, body: &str, date: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.to_string(),
            body: body.to_string(),
            date,
            self_authored: true,
            sent: false,
        }
    }

    /// A message decrypted off the wire.
    pub fn received(plain: PlainMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: plain.from,
            body: plain.body,
            date: plain.date,
            self_authored: plain.is_self,
            sent: false,
        }
    }
}

/// The plaintext body carried inside a sealed message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlainMessage {
    pub from: String,
    #[serde(rename = "message")]
    pub body: String,
    pub date: i64,
    #[serde(rename = "self")]
    pub is_self: bool,
}

impl PlainMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Tolerant decode: each field degrades to its default (`from`/`message`
    /// empty, `date` the caller's fallback, `self` false) instead of failing
    /// the whole message.
    pub fn from_bytes(bytes: &[u8], fallback_date: i64) -> Self {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null);
        Self {
            from: value
                .get("from")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            body: value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            date: value
                .get("date")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(fallback_date),
            is_self: value
                .get("self")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        }
    }
}
