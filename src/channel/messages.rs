use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result message received on the relay channel
///
/// The payload is passed through to the application untouched; only the
/// `final` field is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl RelayMessage {
    /// Parse a UTF-8 JSON relay frame
    pub fn parse(data: &[u8]) -> serde_json::Result<Self> {
        Ok(Self {
            payload: serde_json::from_slice(data)?,
            received_at: Utc::now(),
        })
    }

    /// Whether the backend marked this as the last result of the session
    pub fn is_final(&self) -> bool {
        self.payload
            .get("final")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
