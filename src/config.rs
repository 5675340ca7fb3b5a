use anyhow::Result;
use serde::Deserialize;

use crate::session::TranscriberConfig;

/// Application configuration
///
/// Loaded from a file (TOML, JSON or YAML) with `LIVE_TRANSCRIBER__*`
/// environment overrides, e.g. `LIVE_TRANSCRIBER__TRANSCRIBER__ENDPOINT`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcriber: TranscriberConfig,
    pub source: SourceConfig,
}

/// Audio input used by the command-line client
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// WAV file replayed as the capture device
    pub wav_path: Option<String>,
    /// Feed frames at playback speed
    pub realtime: bool,
    /// Frame duration in milliseconds
    pub frame_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            wav_path: None,
            realtime: true,
            frame_ms: 100,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("LIVE_TRANSCRIBER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[transcriber]
endpoint = "https://gk.example.com/gk"
max_final_wait_ms = 2000

[transcriber.audio_params]
memo = "hello world"

[source]
wav_path = "meeting.wav"
realtime = false
"#
        )
        .unwrap();

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.transcriber.endpoint, "https://gk.example.com/gk");
        assert_eq!(cfg.transcriber.max_final_wait_ms, 2000);
        assert_eq!(cfg.transcriber.export_interval_ms, 250);
        assert_eq!(cfg.transcriber.audio_params["memo"], "hello world");
        assert_eq!(cfg.source.wav_path.as_deref(), Some("meeting.wav"));
        assert!(!cfg.source.realtime);
        assert_eq!(cfg.source.frame_ms, 100);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(Config::load("/nonexistent/live-transcriber").is_err());
    }
}
