pub mod backend;
pub mod capture;
pub mod file;

pub use backend::{
    device_label, AudioContext, AudioFrame, AudioTrack, CaptureAdapter, CaptureFactory,
    CaptureOptions, MediaConstraints, MediaStream, PermissionProvider,
};
pub use capture::{encode_wav, PcmCapture, PcmCaptureFactory};
pub use file::{AudioFile, WavFileSource};
