use serde::Serialize;
use thiserror::Error;

use crate::channel::ChannelKind;
use crate::session::State;

/// Errors surfaced by a transcriber session
///
/// Cloneable so a single in-flight `initialize()` can hand the same outcome
/// to every caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TranscriberError {
    /// Capture permission was denied or no capture device is available
    #[error("permission error: {0}")]
    Permission(String),

    /// The capture adapter could not be set up on the granted stream
    #[error("capture error: {0}")]
    Capture(String),

    /// The upload or relay channel failed before signaling open
    #[error("failed to open {kind} channel: {reason}")]
    ChannelOpen { kind: ChannelKind, reason: String },

    /// Operation called in the wrong lifecycle state
    #[error("Transcriber#{operation}: {expected} (state is {state})")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        state: State,
    },

    /// Sending on an open channel failed
    #[error("channel error: {0}")]
    Channel(String),

    /// Invalid configuration (e.g. an unparseable endpoint)
    #[error("configuration error: {0}")]
    Config(String),
}

impl TranscriberError {
    pub(crate) fn invalid_state(
        operation: &'static str,
        expected: &'static str,
        state: State,
    ) -> Self {
        Self::InvalidState {
            operation,
            expected,
            state,
        }
    }

    /// Whether this error moved the session into the ERROR state
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Permission(_) | Self::Capture(_) | Self::ChannelOpen { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TranscriberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        let err = TranscriberError::invalid_state("start", "not ready", State::Uninitialized);
        assert_eq!(
            err.to_string(),
            "Transcriber#start: not ready (state is UNINITIALIZED)"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_channel_open_message() {
        let err = TranscriberError::ChannelOpen {
            kind: ChannelKind::Relay,
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("relay"));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_fatal());
    }
}
