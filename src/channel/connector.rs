use anyhow::Result;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use url::Url;

/// Which of the two session channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Carries exported audio chunks to the backend
    Audio,
    /// Carries transcription results back from the backend
    Relay,
}

impl ChannelKind {
    /// URL path segment for this channel
    pub fn path_segment(self) -> &'static str {
        match self {
            ChannelKind::Audio => "audio",
            ChannelKind::Relay => "relay",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Events delivered by an open channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The channel closed; no further events follow
    Closed,
}

/// Outbound half of an open channel
pub trait ChannelSink: Send + Sync {
    /// Queue a binary message; does not wait for delivery
    fn send(&self, data: Vec<u8>) -> Result<()>;

    /// Begin closing the channel
    fn close(&self);
}

/// A channel that has signaled open
pub struct OpenChannel {
    pub sink: Box<dyn ChannelSink>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens channels to the transcription backend
///
/// `open` resolves once the channel signals open and fails if it signals an
/// error first. Implementations must not retry.
#[async_trait::async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: Url) -> Result<OpenChannel>;
}
