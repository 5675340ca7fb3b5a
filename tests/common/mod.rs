// Test doubles for the transcriber's injected capabilities
//
// Each mock shares its recorded state through Arcs so tests can keep a clone
// after handing the original to the builder.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use live_transcriber::{
    AudioFrame, AudioTrack, CaptureAdapter, CaptureFactory, CaptureOptions, ChannelConnector,
    ChannelEvent, ChannelKind, ChannelSink, MediaConstraints, MediaStream, OpenChannel,
    PermissionProvider, Transcriber, TranscriberConfig, TranscriberEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use url::Url;

pub const DEVICE_LABEL: &str = "Default - Some Mic Device";

// ============================================================================
// Permission
// ============================================================================

#[derive(Clone)]
pub struct MockPermission {
    label: String,
    fail: Option<String>,
    calls: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

impl MockPermission {
    pub fn granted(label: &str) -> Self {
        Self {
            label: label.to_string(),
            fail: None,
            calls: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn denied(reason: &str) -> Self {
        Self {
            fail: Some(reason.to_string()),
            ..Self::granted(DEVICE_LABEL)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tracks_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PermissionProvider for MockPermission {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Arc<dyn MediaStream>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(constraints, MediaConstraints::audio_only());

        tokio::time::sleep(Duration::from_millis(10)).await;

        if let Some(reason) = &self.fail {
            return Err(anyhow!("{}", reason));
        }

        Ok(Arc::new(MockStream {
            label: self.label.clone(),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct MockStream {
    label: String,
    stopped: Arc<AtomicBool>,
}

impl MediaStream for MockStream {
    fn audio_tracks(&self) -> Vec<AudioTrack> {
        vec![AudioTrack {
            label: self.label.clone(),
        }]
    }

    fn stop_tracks(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        None
    }
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    pub created: usize,
    pub started: usize,
    pub stopped: usize,
    pub exports: usize,
}

#[derive(Clone, Default)]
pub struct MockCaptureFactory {
    log: Arc<Mutex<CaptureLog>>,
    empty: Arc<AtomicBool>,
}

impl MockCaptureFactory {
    pub fn log(&self) -> CaptureLog {
        self.log.lock().unwrap().clone()
    }

    /// Make every export return an empty chunk
    pub fn export_empty(&self, empty: bool) {
        self.empty.store(empty, Ordering::SeqCst);
    }
}

impl CaptureFactory for MockCaptureFactory {
    fn create(
        &self,
        _stream: Arc<dyn MediaStream>,
        options: CaptureOptions,
    ) -> Result<Box<dyn CaptureAdapter>> {
        assert_eq!(options.export_sample_rate, 16000);
        self.log.lock().unwrap().created += 1;

        Ok(Box::new(MockCapture {
            log: Arc::clone(&self.log),
            empty: Arc::clone(&self.empty),
        }))
    }
}

struct MockCapture {
    log: Arc<Mutex<CaptureLog>>,
    empty: Arc<AtomicBool>,
}

impl CaptureAdapter for MockCapture {
    fn start(&mut self) {
        self.log.lock().unwrap().started += 1;
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stopped += 1;
    }

    fn export(&mut self) -> Vec<u8> {
        self.log.lock().unwrap().exports += 1;
        if self.empty.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            vec![0; 5]
        }
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Test-side handle to one opened channel
#[derive(Clone)]
pub struct MockChannel {
    pub url: Url,
    events: mpsc::UnboundedSender<ChannelEvent>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl MockChannel {
    /// Deliver a text message as if the backend sent it
    pub fn push_text(&self, text: &str) {
        let _ = self.events.send(ChannelEvent::Text(text.to_string()));
    }

    /// Close the channel from the backend side
    pub fn close_remote(&self) {
        let _ = self.events.send(ChannelEvent::Closed);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether the session closed this channel
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelSink for MockSink {
    fn send(&self, data: Vec<u8>) -> Result<()> {
        self.sent.lock().unwrap().push(data);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    attempts: Arc<Mutex<Vec<Url>>>,
    opened: Arc<Mutex<Vec<(ChannelKind, MockChannel)>>>,
    fail: Option<ChannelKind>,
}

impl MockConnector {
    /// Channels of `kind` signal an error before opening
    pub fn failing(kind: ChannelKind) -> Self {
        Self {
            fail: Some(kind),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<Url> {
        self.attempts.lock().unwrap().clone()
    }

    /// Most recently opened channel of `kind`
    pub fn channel(&self, kind: ChannelKind) -> MockChannel {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, channel)| channel.clone())
            .unwrap_or_else(|| panic!("no {} channel opened", kind))
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

pub fn kind_of(url: &Url) -> ChannelKind {
    if url.path().contains("/relay/") {
        ChannelKind::Relay
    } else {
        ChannelKind::Audio
    }
}

#[async_trait::async_trait]
impl ChannelConnector for MockConnector {
    async fn open(&self, url: Url) -> Result<OpenChannel> {
        self.attempts.lock().unwrap().push(url.clone());

        // Open asynchronously, like a real socket
        tokio::task::yield_now().await;

        let kind = kind_of(&url);
        if self.fail == Some(kind) {
            return Err(anyhow!("error before open"));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        self.opened.lock().unwrap().push((
            kind,
            MockChannel {
                url,
                events: events_tx,
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            },
        ));

        Ok(OpenChannel {
            sink: Box::new(MockSink { sent, closed }),
            events: events_rx,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub transcriber: Transcriber,
    pub permission: MockPermission,
    pub capture: MockCaptureFactory,
    pub connector: MockConnector,
    pub events: broadcast::Receiver<TranscriberEvent>,
}

pub fn config() -> TranscriberConfig {
    let mut config = TranscriberConfig::new("http://gk.test/gk");
    config
        .audio_params
        .insert("memo".to_string(), "hello world".to_string());
    config
        .relay_params
        .insert("format".to_string(), "json".to_string());
    config
}

pub fn harness() -> Harness {
    harness_with(MockConnector::default(), MockPermission::granted(DEVICE_LABEL))
}

pub fn harness_with(connector: MockConnector, permission: MockPermission) -> Harness {
    let capture = MockCaptureFactory::default();

    let transcriber = Transcriber::builder(config())
        .permission(permission.clone())
        .connector(connector.clone())
        .capture_factory(capture.clone())
        .build()
        .unwrap();
    let events = transcriber.subscribe();

    Harness {
        transcriber,
        permission,
        capture,
        connector,
        events,
    }
}

/// A harness already in RECORDING, with its events drained
pub async fn recording_harness() -> Harness {
    let mut h = harness();
    h.transcriber.initialize().await.unwrap();
    h.transcriber.start().unwrap().await.unwrap();
    drain(&mut h.events);
    h
}

/// Names of every event received so far
pub fn drain(events: &mut broadcast::Receiver<TranscriberEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    names
}
