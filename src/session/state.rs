use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a transcriber session
///
/// ```text
/// UNINITIALIZED → INITIALIZING → READY → INITIALIZING_RECORDING → RECORDING
///                      │                          │                   │
///                      ▼                          ▼                   ▼
///                    ERROR                      ERROR       FINALIZING_RECORDING → READY
/// ```
///
/// `destroy()` returns to UNINITIALIZED from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Uninitialized,
    Initializing,
    Error,
    Ready,
    InitializingRecording,
    Recording,
    FinalizingRecording,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Uninitialized => "UNINITIALIZED",
            State::Initializing => "INITIALIZING",
            State::Error => "ERROR",
            State::Ready => "READY",
            State::InitializingRecording => "INITIALIZING_RECORDING",
            State::Recording => "RECORDING",
            State::FinalizingRecording => "FINALIZING_RECORDING",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
