//! Transcriber session state machine
//!
//! This module provides the `Transcriber` that coordinates:
//! - Capture permission and the capture adapter
//! - The audio (upload) and relay (results) channels
//! - Periodic chunk export while recording
//! - Bounded finalization waiting for the backend's final result
//! - Lifecycle and data events for the embedding application

mod builder;
mod config;
mod events;
mod state;
mod transcriber;

pub use builder::TranscriberBuilder;
pub use config::TranscriberConfig;
pub use events::{SessionInfo, TranscriberEvent};
pub use state::State;
pub use transcriber::{PendingStart, Transcriber};
