use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::config::TranscriberConfig;
use super::transcriber::{Parts, Transcriber};
use crate::audio::{AudioContext, CaptureFactory, PcmCaptureFactory, PermissionProvider};
use crate::channel::{parse_endpoint, ChannelConnector, WsConnector};
use crate::error::{Result, TranscriberError};

/// Assembles a [`Transcriber`] from configuration and injected capabilities
///
/// Defaults: WebSocket channels, PCM capture exporting WAV chunks, and no
/// permission provider (`initialize()` then fails with a permission error).
pub struct TranscriberBuilder {
    config: TranscriberConfig,
    permission: Option<Arc<dyn PermissionProvider>>,
    connector: Arc<dyn ChannelConnector>,
    capture_factory: Arc<dyn CaptureFactory>,
    audio_context: AudioContext,
}

impl TranscriberBuilder {
    pub fn new(config: TranscriberConfig) -> Self {
        Self {
            config,
            permission: None,
            connector: Arc::new(WsConnector),
            capture_factory: Arc::new(PcmCaptureFactory),
            audio_context: AudioContext::default(),
        }
    }

    /// Provider used to acquire the capture stream
    pub fn permission(mut self, permission: impl PermissionProvider + 'static) -> Self {
        self.permission = Some(Arc::new(permission));
        self
    }

    /// Transport used to open the audio and relay channels
    pub fn connector(mut self, connector: impl ChannelConnector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn capture_factory(mut self, factory: impl CaptureFactory + 'static) -> Self {
        self.capture_factory = Arc::new(factory);
        self
    }

    pub fn audio_context(mut self, audio_context: AudioContext) -> Self {
        self.audio_context = audio_context;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn max_final_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_final_wait_ms = max_wait.as_millis() as u64;
        self
    }

    pub fn audio_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.audio_params = collect_params(params);
        self
    }

    pub fn relay_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.relay_params = collect_params(params);
        self
    }

    pub fn build(self) -> Result<Transcriber> {
        let endpoint = parse_endpoint(&self.config.endpoint)?;

        if self.config.export_interval_ms == 0 {
            return Err(TranscriberError::Config(
                "export_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.config.export_sample_rate == 0 {
            return Err(TranscriberError::Config(
                "export_sample_rate must be greater than zero".to_string(),
            ));
        }

        Ok(Transcriber::from_parts(Parts {
            config: self.config,
            endpoint,
            permission: self.permission,
            connector: self.connector,
            capture_factory: self.capture_factory,
            audio_context: self.audio_context,
        }))
    }
}

fn collect_params<K, V>(params: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    params
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
