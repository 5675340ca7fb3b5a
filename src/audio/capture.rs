use anyhow::{Context, Result};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backend::{
    AudioFrame, CaptureAdapter, CaptureFactory, CaptureOptions, MediaStream,
};

/// Default capture factory producing [`PcmCapture`] adapters
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmCaptureFactory;

impl CaptureFactory for PcmCaptureFactory {
    fn create(
        &self,
        stream: Arc<dyn MediaStream>,
        options: CaptureOptions,
    ) -> Result<Box<dyn CaptureAdapter>> {
        if options.audio_context.channels == 0 {
            anyhow::bail!("Audio context must have at least one channel");
        }
        Ok(Box::new(PcmCapture::new(stream.as_ref(), options)))
    }
}

/// Capture adapter that buffers PCM frames and exports them as WAV blobs
///
/// Frames are pulled from the stream's feed on every `export`/`stop`, converted
/// to the export format (mono, `export_sample_rate`) and appended to an
/// in-memory buffer. `export` encodes and clears the buffer.
pub struct PcmCapture {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    options: CaptureOptions,
    buffer: Vec<i16>,
    capturing: bool,
}

impl PcmCapture {
    pub fn new(stream: &dyn MediaStream, options: CaptureOptions) -> Self {
        let frames = stream.take_frames();
        if frames.is_none() {
            warn!("Media stream has no frame feed; exports will be empty");
        }

        Self {
            frames,
            options,
            buffer: Vec::new(),
            capturing: false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Pull every queued frame; keep them only while capturing
    fn drain(&mut self) {
        let Some(frames) = self.frames.as_mut() else {
            return;
        };

        while let Ok(frame) = frames.try_recv() {
            if !self.capturing {
                continue;
            }
            let processed = process_frame(
                frame,
                self.options.export_sample_rate,
                self.options.audio_context.channels,
            );
            self.buffer.extend_from_slice(&processed.samples);
        }

        let max_samples = self.max_buffered_samples();
        if self.buffer.len() > max_samples {
            let excess = self.buffer.len() - max_samples;
            debug!("Capture buffer full, dropping {} samples", excess);
            self.buffer.drain(..excess);
        }
    }

    fn max_buffered_samples(&self) -> usize {
        let ctx = &self.options.audio_context;
        (self.options.export_sample_rate as u64 * ctx.channels.max(1) as u64 * ctx.max_buffered_ms
            / 1000) as usize
    }
}

impl CaptureAdapter for PcmCapture {
    fn start(&mut self) {
        // Discard audio queued while idle
        self.drain();
        self.buffer.clear();
        self.capturing = true;
    }

    fn stop(&mut self) {
        self.drain();
        self.capturing = false;
    }

    fn export(&mut self) -> Vec<u8> {
        self.drain();

        if self.buffer.is_empty() {
            return Vec::new();
        }

        let samples = std::mem::take(&mut self.buffer);
        match encode_wav(
            &samples,
            self.options.export_sample_rate,
            self.options.audio_context.channels,
        ) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to encode audio chunk: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Encode interleaved 16-bit samples as an in-memory WAV file
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV chunk")?;
    }

    Ok(cursor.into_inner())
}

/// Convert a frame to the export format
fn process_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != target_channels {
        processed = to_mono(processed);
        if target_channels > 1 {
            processed = upmix(processed, target_channels);
        }
    }

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    processed
}

/// Downsample by decimation
fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if target_rate == 0 || frame.sample_rate <= target_rate {
        return frame; // Can't upsample
    }

    let ratio = (frame.sample_rate / target_rate) as usize;
    let channels = frame.channels.max(1) as usize;

    // Decimate whole interleaved frames: keep every Nth frame
    let downsampled: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Average interleaved channels into one
fn to_mono(frame: AudioFrame) -> AudioFrame {
    let channels = frame.channels as usize;
    if channels <= 1 {
        return AudioFrame {
            channels: 1,
            ..frame
        };
    }

    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Copy a mono frame onto every output channel
fn upmix(frame: AudioFrame, channels: u16) -> AudioFrame {
    let samples = frame
        .samples
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
        .collect();

    AudioFrame {
        samples,
        sample_rate: frame.sample_rate,
        channels,
        timestamp_ms: frame.timestamp_ms,
    }
}
