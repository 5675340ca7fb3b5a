pub mod audio;
pub mod channel;
pub mod config;
pub mod error;
pub mod session;

pub use audio::{
    AudioContext, AudioFile, AudioFrame, AudioTrack, CaptureAdapter, CaptureFactory,
    CaptureOptions, MediaConstraints, MediaStream, PcmCapture, PcmCaptureFactory,
    PermissionProvider, WavFileSource,
};
pub use channel::{
    ChannelConnector, ChannelEvent, ChannelKind, ChannelSink, OpenChannel, RelayMessage,
    WsConnector,
};
pub use config::Config;
pub use error::{Result, TranscriberError};
pub use session::{
    PendingStart, SessionInfo, State, Transcriber, TranscriberBuilder, TranscriberConfig,
    TranscriberEvent,
};
