//! Upload and relay channels
//!
//! A session opens two channels to the transcription backend: one carrying
//! exported audio chunks, one relaying results back. The session only sees the
//! [`ChannelConnector`] / [`ChannelSink`] seams; [`WsConnector`] is the default
//! WebSocket transport.

mod connector;
mod endpoint;
pub mod messages;
mod ws;

pub use connector::{ChannelConnector, ChannelEvent, ChannelKind, ChannelSink, OpenChannel};
pub use endpoint::{channel_url, parse_endpoint};
pub use messages::RelayMessage;
pub use ws::WsConnector;
