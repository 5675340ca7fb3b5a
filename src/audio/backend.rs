use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Constraints passed to the permission provider when requesting capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Audio on, video off
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// Description of one audio track in a granted stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    /// Human-readable device label as reported by the platform
    pub label: String,
}

/// A granted media stream
///
/// Implementations:
/// - `WavFileSource`: a WAV file replayed as a live input
/// - Test doubles in `tests/common`
pub trait MediaStream: Send + Sync {
    /// Audio tracks in this stream; the first one names the device
    fn audio_tracks(&self) -> Vec<AudioTrack>;

    /// Stop every underlying track and release the device
    fn stop_tracks(&self);

    /// Take the frame feed for this stream
    ///
    /// There is a single consumer; later calls return `None`.
    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>>;
}

/// Grants access to a capture device
#[async_trait::async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Request a media stream satisfying `constraints`
    ///
    /// Fails when permission is denied or no device is available.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Arc<dyn MediaStream>>;
}

/// Audio processing settings shared by capture adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioContext {
    /// Output channel count (1 = mono)
    pub channels: u16,
    /// Upper bound on audio buffered between exports, in milliseconds
    /// Older samples are dropped first
    pub max_buffered_ms: u64,
}

impl Default for AudioContext {
    fn default() -> Self {
        Self {
            channels: 1,            // Mono
            max_buffered_ms: 10_000, // 10 seconds
        }
    }
}

/// Options handed to a capture factory
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Sample rate of exported chunks (transcription backends expect 16kHz)
    pub export_sample_rate: u32,
    pub audio_context: AudioContext,
}

/// Capture adapter bound to a granted stream
///
/// All methods are synchronous; they run inside state transitions.
pub trait CaptureAdapter: Send {
    /// Begin buffering audio from the stream
    fn start(&mut self);

    /// Stop buffering; audio captured so far stays available to `export`
    fn stop(&mut self);

    /// Export everything buffered since the last export
    ///
    /// An empty blob means there is no new data.
    fn export(&mut self) -> Vec<u8>;
}

/// Builds capture adapters for granted streams
pub trait CaptureFactory: Send + Sync {
    fn create(
        &self,
        stream: Arc<dyn MediaStream>,
        options: CaptureOptions,
    ) -> Result<Box<dyn CaptureAdapter>>;
}

/// Strip the platform's "default - " prefix from a device label
pub fn device_label(label: &str) -> String {
    const DEFAULT_PREFIX: &str = "default - ";

    match label.get(..DEFAULT_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(DEFAULT_PREFIX) => {
            label[DEFAULT_PREFIX.len()..].to_string()
        }
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_label_strips_default_prefix() {
        assert_eq!(device_label("Default - Some Mic Device"), "Some Mic Device");
        assert_eq!(device_label("DEFAULT - Some Mic Device"), "Some Mic Device");
        assert_eq!(device_label("default - USB Mic"), "USB Mic");
    }

    #[test]
    fn test_device_label_keeps_other_labels() {
        assert_eq!(device_label("Built-in Microphone"), "Built-in Microphone");
        assert_eq!(device_label("Defaults Mic"), "Defaults Mic");
        assert_eq!(device_label(""), "");
        // Multi-byte prefix must not split a char boundary
        assert_eq!(device_label("Micrófono interno"), "Micrófono interno");
    }

    #[test]
    fn test_audio_context_default() {
        let ctx = AudioContext::default();
        assert_eq!(ctx.channels, 1, "Default should be mono");
        assert_eq!(ctx.max_buffered_ms, 10_000);
    }
}
