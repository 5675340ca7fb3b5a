use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for a transcriber session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Base endpoint of the transcription backend (http, https, ws or wss)
    /// Channels connect to `<endpoint>/audio/<id>` and `<endpoint>/relay/<id>`
    pub endpoint: String,

    /// Upper bound on how long `stop()` waits for the final result
    /// Default: 5000 ms
    pub max_final_wait_ms: u64,

    /// Interval between chunk exports while recording
    /// Default: 250 ms
    pub export_interval_ms: u64,

    /// Sample rate of exported audio chunks (backends expect 16kHz)
    pub export_sample_rate: u32,

    /// Extra query parameters for the audio channel
    pub audio_params: BTreeMap<String, String>,

    /// Extra query parameters for the relay channel
    pub relay_params: BTreeMap<String, String>,
}

impl TranscriberConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn max_final_wait(&self) -> Duration {
        Duration::from_millis(self.max_final_wait_ms)
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            max_final_wait_ms: 5000,
            export_interval_ms: 250,
            export_sample_rate: 16000, // Whisper expects 16kHz
            audio_params: BTreeMap::new(),
            relay_params: BTreeMap::new(),
        }
    }
}
