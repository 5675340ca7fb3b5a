use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::state::State;

/// Snapshot of a session, attached to every event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Lifecycle state when the event was emitted
    pub state: State,

    /// Identifier of the current (or last) recording session
    pub session_id: Option<Uuid>,

    /// Capture device label, without the platform's default prefix
    pub device: Option<String>,
}

/// Events emitted to the embedding application
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TranscriberEvent {
    /// Capture permission granted; the session can start recording
    Ready { session: SessionInfo },

    /// Both channels are open and audio is being uploaded
    Started { session: SessionInfo },

    /// Recording stopped without finalization
    Canceled { session: SessionInfo },

    /// Recording finalized and both channels closed
    Stopped { session: SessionInfo },

    /// A result message arrived on the relay channel
    DataReceived {
        session: SessionInfo,
        payload: Value,
        received_at: DateTime<Utc>,
    },
}

impl TranscriberEvent {
    pub fn session(&self) -> &SessionInfo {
        match self {
            TranscriberEvent::Ready { session }
            | TranscriberEvent::Started { session }
            | TranscriberEvent::Canceled { session }
            | TranscriberEvent::Stopped { session }
            | TranscriberEvent::DataReceived { session, .. } => session,
        }
    }

    /// Event name as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TranscriberEvent::Ready { .. } => "ready",
            TranscriberEvent::Started { .. } => "started",
            TranscriberEvent::Canceled { .. } => "canceled",
            TranscriberEvent::Stopped { .. } => "stopped",
            TranscriberEvent::DataReceived { .. } => "data_received",
        }
    }
}
