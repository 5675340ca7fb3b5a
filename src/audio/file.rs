use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{AudioFrame, AudioTrack, MediaConstraints, MediaStream, PermissionProvider};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into fixed-duration frames
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let channels = self.channels.max(1) as usize;
        let per_frame =
            ((self.sample_rate as u64 * frame_ms / 1000) as usize).max(1) * channels;

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Permission provider that grants a WAV file as if it were a live device
///
/// Each granted stream replays the file from the start, one frame every
/// `frame_ms` when `realtime` is set, otherwise as fast as the consumer reads.
#[derive(Debug, Clone)]
pub struct WavFileSource {
    path: PathBuf,
    frame_ms: u64,
    realtime: bool,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_ms: 100,
            realtime: true,
        }
    }

    pub fn frame_ms(mut self, frame_ms: u64) -> Self {
        self.frame_ms = frame_ms.max(1);
        self
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Playback duration of the file
    pub fn duration(&self) -> Result<Duration> {
        let reader = WavReader::open(&self.path)
            .with_context(|| format!("Failed to open WAV file: {}", self.path.display()))?;
        let spec = reader.spec();
        Ok(Duration::from_secs_f64(
            reader.duration() as f64 / spec.sample_rate as f64,
        ))
    }

    fn label(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        format!("WAV file ({})", name)
    }
}

#[async_trait::async_trait]
impl PermissionProvider for WavFileSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Arc<dyn MediaStream>> {
        if !constraints.audio {
            anyhow::bail!("WAV file source only provides audio");
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV loading task failed")??;

        let frames = audio.frames(self.frame_ms);
        let (tx, rx) = mpsc::channel(64);
        let stopped = Arc::new(AtomicBool::new(false));

        let feeder_stopped = Arc::clone(&stopped);
        let pace = self.realtime.then(|| Duration::from_millis(self.frame_ms));
        tokio::spawn(async move {
            for frame in frames {
                if feeder_stopped.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
                if let Some(pace) = pace {
                    tokio::time::sleep(pace).await;
                }
            }
            debug!("WAV file feed finished");
        });

        Ok(Arc::new(FileStream {
            label: self.label(),
            stopped,
            frames: Mutex::new(Some(rx)),
        }))
    }
}

struct FileStream {
    label: String,
    stopped: Arc<AtomicBool>,
    frames: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl MediaStream for FileStream {
    fn audio_tracks(&self) -> Vec<AudioTrack> {
        vec![AudioTrack {
            label: self.label.clone(),
        }]
    }

    fn stop_tracks(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.lock().ok().and_then(|mut frames| frames.take())
    }
}
