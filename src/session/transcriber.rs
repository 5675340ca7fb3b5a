use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::builder::TranscriberBuilder;
use super::config::TranscriberConfig;
use super::events::{SessionInfo, TranscriberEvent};
use super::state::State;
use crate::audio::{
    device_label, AudioContext, CaptureAdapter, CaptureFactory, CaptureOptions, MediaConstraints,
    MediaStream, PermissionProvider,
};
use crate::channel::{
    channel_url, ChannelConnector, ChannelEvent, ChannelKind, ChannelSink, OpenChannel,
    RelayMessage,
};
use crate::error::{Result, TranscriberError};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 64;

const NO_PERMISSION_PROVIDER: &str = "no access to a media capture provider, the application may need to be served over a secure transport";

type InitFuture = Shared<BoxFuture<'static, Result<()>>>;

/// Client-side transcription session
///
/// Captures audio from a granted media stream, uploads exported chunks on the
/// audio channel and re-emits results arriving on the relay channel. Cheap to
/// clone; clones share the same session.
#[derive(Clone)]
pub struct Transcriber {
    core: Arc<Core>,
}

/// Injected collaborators, assembled by [`TranscriberBuilder`]
pub(super) struct Parts {
    pub config: TranscriberConfig,
    pub endpoint: Url,
    pub permission: Option<Arc<dyn PermissionProvider>>,
    pub connector: Arc<dyn ChannelConnector>,
    pub capture_factory: Arc<dyn CaptureFactory>,
    pub audio_context: AudioContext,
}

struct Core {
    config: TranscriberConfig,
    endpoint: Url,
    permission: Option<Arc<dyn PermissionProvider>>,
    connector: Arc<dyn ChannelConnector>,
    capture_factory: Arc<dyn CaptureFactory>,
    audio_context: AudioContext,
    events: broadcast::Sender<TranscriberEvent>,
    /// Set by the relay channel when the backend reports its last result
    final_result: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

/// Mutable session state; only touched inside state transitions
struct Inner {
    state: State,
    /// In-flight `initialize()` shared by concurrent callers
    init: Option<InitFuture>,
    /// Bumped by `destroy()` so a stale acquisition cannot complete
    init_epoch: u64,
    stream: Option<Arc<dyn MediaStream>>,
    device: Option<String>,
    capture: Option<Box<dyn CaptureAdapter>>,
    session_id: Option<Uuid>,
    upload: Option<Box<dyn ChannelSink>>,
    relay: Option<Box<dyn ChannelSink>>,
    export_timer: Option<JoinHandle<()>>,
    last_error: Option<TranscriberError>,
}

impl Transcriber {
    pub fn builder(config: TranscriberConfig) -> TranscriberBuilder {
        TranscriberBuilder::new(config)
    }

    pub(super) fn from_parts(parts: Parts) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (final_result, _) = watch::channel(false);

        Self {
            core: Arc::new(Core {
                config: parts.config,
                endpoint: parts.endpoint,
                permission: parts.permission,
                connector: parts.connector,
                capture_factory: parts.capture_factory,
                audio_context: parts.audio_context,
                events,
                final_result,
                inner: Mutex::new(Inner::new()),
            }),
        }
    }

    /// Register a listener for session events
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriberEvent> {
        self.core.events.subscribe()
    }

    pub fn state(&self) -> State {
        self.core.lock().state
    }

    /// Label of the capture device, once initialized
    pub fn device(&self) -> Option<String> {
        self.core.lock().device.clone()
    }

    /// Identifier of the current or most recent recording session
    pub fn session_id(&self) -> Option<Uuid> {
        self.core.lock().session_id
    }

    /// The failure that last moved the session into ERROR
    pub fn last_error(&self) -> Option<TranscriberError> {
        self.core.lock().last_error.clone()
    }

    pub fn info(&self) -> SessionInfo {
        self.core.lock().info()
    }

    pub fn config(&self) -> &TranscriberConfig {
        &self.core.config
    }

    /// Request capture permission and set up the capture adapter
    ///
    /// Concurrent calls share one acquisition. Once READY (or recording),
    /// further calls resolve immediately.
    pub async fn initialize(&self) -> Result<()> {
        let pending = {
            let mut inner = self.core.lock();
            match (inner.state, inner.init.clone()) {
                (State::Initializing, Some(pending)) => {
                    debug!("Initialization already in progress");
                    pending
                }
                (State::Uninitialized | State::Error | State::Initializing, _) => {
                    self.core.begin_initialize(&mut inner)
                }
                (state, _) => {
                    debug!("Already initialized ({})", state);
                    return Ok(());
                }
            }
        };

        pending.await
    }

    /// Open both channels and begin recording
    ///
    /// Fails immediately with `InvalidState` unless READY. Otherwise the
    /// session moves to INITIALIZING_RECORDING before this returns, and the
    /// returned future resolves once both channels are open and recording has
    /// begun. Dropping the future does not abort the negotiation.
    pub fn start(&self) -> Result<PendingStart> {
        let session_id = {
            let mut inner = self.core.lock();
            if inner.state != State::Ready {
                return Err(TranscriberError::invalid_state(
                    "start",
                    "not ready",
                    inner.state,
                ));
            }

            // No export timer may outlive its session
            if let Some(timer) = inner.export_timer.take() {
                timer.abort();
            }

            let session_id = Uuid::new_v4();
            info!("Starting recording session: {}", session_id);

            inner.session_id = Some(session_id);
            inner.state = State::InitializingRecording;
            self.core.final_result.send_replace(false);
            session_id
        };

        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move { core.open_channels(session_id).await });

        Ok(PendingStart { task })
    }

    /// Finish recording
    ///
    /// Stops capture, uploads the remaining audio, closes the audio channel and
    /// waits (bounded by `max_final_wait`) for the final result before closing
    /// the relay channel. A no-op unless RECORDING.
    pub async fn stop(&self) -> Result<()> {
        let (session_id, final_result) = {
            let mut inner = self.core.lock();
            if inner.state != State::Recording {
                debug!("stop() while {}; nothing to do", inner.state);
                return Ok(());
            }

            info!("Finalizing recording session");
            inner.state = State::FinalizingRecording;
            inner.stop_capture();
            inner.push_chunk();

            if let Some(upload) = inner.upload.take() {
                upload.close();
            }

            (inner.session_id, self.core.final_result.subscribe())
        };

        let max_wait = self.core.config.max_final_wait();
        if tokio::time::timeout(max_wait, wait_for_final(final_result))
            .await
            .is_err()
        {
            info!("No final result within {:?}, closing relay", max_wait);
        }

        let mut inner = self.core.lock();
        if inner.state != State::FinalizingRecording || inner.session_id != session_id {
            warn!("Session torn down while finalizing ({})", inner.state);
            return Ok(());
        }

        if let Some(relay) = inner.relay.take() {
            relay.close();
        }
        inner.state = State::Ready;
        info!("Recording session stopped");
        self.core
            .emit(&inner, |session| TranscriberEvent::Stopped { session });

        Ok(())
    }

    /// Abort recording without finalization
    ///
    /// Stops capture and returns to READY immediately. Channels are left open.
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.core.lock();
        if inner.state != State::Recording {
            return Err(TranscriberError::invalid_state(
                "cancel",
                "not recording",
                inner.state,
            ));
        }

        self.core.cancel_recording(&mut inner);
        Ok(())
    }

    /// Release the capture device and return to UNINITIALIZED
    pub fn destroy(&self) {
        let mut inner = self.core.lock();

        if let Some(timer) = inner.export_timer.take() {
            timer.abort();
        }
        if let Some(stream) = inner.stream.take() {
            stream.stop_tracks();
        }
        inner.capture = None;
        inner.device = None;

        for sink in [inner.upload.take(), inner.relay.take()].into_iter().flatten() {
            sink.close();
        }

        inner.init = None;
        inner.init_epoch += 1;

        if inner.state != State::Uninitialized {
            info!("Transcriber destroyed (was {})", inner.state);
        }
        inner.state = State::Uninitialized;
    }
}

impl fmt::Debug for Transcriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.core.lock();
        f.debug_struct("Transcriber")
            .field("state", &inner.state)
            .field("session_id", &inner.session_id)
            .field("device", &inner.device)
            .finish()
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, inner: &Inner, make: impl FnOnce(SessionInfo) -> TranscriberEvent) {
        let event = make(inner.info());
        debug!("Emitting {} event", event.name());
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Record a fatal failure and move to ERROR
    fn fail(&self, inner: &mut Inner, err: TranscriberError) -> Result<()> {
        inner.last_error = Some(err.clone());
        inner.state = State::Error;
        Err(err)
    }

    fn begin_initialize(self: &Arc<Self>, inner: &mut Inner) -> InitFuture {
        info!("Initializing transcriber: requesting capture permission");

        inner.state = State::Initializing;
        inner.init_epoch += 1;
        let epoch = inner.init_epoch;

        let core = Arc::clone(self);
        let task = tokio::spawn(async move { core.acquire_capture(epoch).await });

        let pending = async move {
            task.await.unwrap_or_else(|e| {
                Err(TranscriberError::Permission(format!(
                    "initialization task failed: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        inner.init = Some(pending.clone());
        pending
    }

    async fn acquire_capture(self: Arc<Self>, epoch: u64) -> Result<()> {
        let acquired = self.request_capture().await;

        let mut inner = self.lock();
        if inner.init_epoch != epoch || inner.state != State::Initializing {
            if let Ok((stream, _, _)) = &acquired {
                stream.stop_tracks();
            }
            warn!("Transcriber destroyed while initializing");
            return Err(TranscriberError::invalid_state(
                "initialize",
                "destroyed while initializing",
                inner.state,
            ));
        }
        inner.init = None;

        match acquired {
            Ok((stream, capture, device)) => {
                info!("Capture ready on device: {}", device);
                if let Some(previous) = inner.stream.replace(stream) {
                    previous.stop_tracks();
                }
                inner.capture = Some(capture);
                inner.device = Some(device);
                inner.state = State::Ready;
                self.emit(&inner, |session| TranscriberEvent::Ready { session });
                Ok(())
            }
            Err(err) => {
                error!("Initialization failed: {}", err);
                self.fail(&mut inner, err)
            }
        }
    }

    async fn request_capture(
        &self,
    ) -> Result<(Arc<dyn MediaStream>, Box<dyn CaptureAdapter>, String)> {
        let permission = self
            .permission
            .as_ref()
            .ok_or_else(|| TranscriberError::Permission(NO_PERMISSION_PROVIDER.to_string()))?;

        let stream = permission
            .acquire(MediaConstraints::audio_only())
            .await
            .map_err(|e| TranscriberError::Permission(format!("{:#}", e)))?;

        let Some(track) = stream.audio_tracks().into_iter().next() else {
            stream.stop_tracks();
            return Err(TranscriberError::Permission(
                "granted stream has no audio track".to_string(),
            ));
        };
        let device = device_label(&track.label);

        let options = CaptureOptions {
            export_sample_rate: self.config.export_sample_rate,
            audio_context: self.audio_context.clone(),
        };
        let capture = match self.capture_factory.create(Arc::clone(&stream), options) {
            Ok(capture) => capture,
            Err(e) => {
                stream.stop_tracks();
                return Err(TranscriberError::Capture(format!("{:#}", e)));
            }
        };

        Ok((stream, capture, device))
    }

    async fn open_channels(self: Arc<Self>, session_id: Uuid) -> Result<()> {
        // Join, not race: both attempts settle before we decide
        let (upload, relay) = future::join(
            self.open_channel(ChannelKind::Audio, session_id),
            self.open_channel(ChannelKind::Relay, session_id),
        )
        .await;

        let mut inner = self.lock();
        if inner.state != State::InitializingRecording || inner.session_id != Some(session_id) {
            warn!("Session {} torn down while opening channels", session_id);
            for sink in [upload, relay].into_iter().flatten() {
                sink.close();
            }
            return Err(TranscriberError::invalid_state(
                "start",
                "torn down while opening channels",
                inner.state,
            ));
        }

        // A channel that opened is kept even if its sibling failed
        let mut failure = None;
        match upload {
            Ok(sink) => inner.upload = Some(sink),
            Err(e) => failure = Some(e),
        }
        match relay {
            Ok(sink) => inner.relay = Some(sink),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }

        if let Some(err) = failure {
            error!("Failed to start recording session {}: {}", session_id, err);
            return self.fail(&mut inner, err);
        }

        if let Some(capture) = inner.capture.as_mut() {
            capture.start();
        }
        inner.export_timer = Some(self.spawn_export_timer(session_id));
        inner.state = State::Recording;

        info!("Recording session started: {}", session_id);
        self.emit(&inner, |session| TranscriberEvent::Started { session });

        Ok(())
    }

    async fn open_channel(
        self: &Arc<Self>,
        kind: ChannelKind,
        session_id: Uuid,
    ) -> Result<Box<dyn ChannelSink>> {
        let params = match kind {
            ChannelKind::Audio => &self.config.audio_params,
            ChannelKind::Relay => &self.config.relay_params,
        };
        let url = channel_url(&self.endpoint, kind, &session_id, params)?;

        info!("Opening {} channel: {}", kind, url);

        let OpenChannel { sink, events } = self.connector.open(url).await.map_err(|e| {
            warn!("{} channel failed to open: {:#}", kind, e);
            TranscriberError::ChannelOpen {
                kind,
                reason: format!("{:#}", e),
            }
        })?;

        info!("{} channel open for session {}", kind, session_id);
        self.spawn_channel_listener(kind, session_id, events);

        Ok(sink)
    }

    fn spawn_channel_listener(
        self: &Arc<Self>,
        kind: ChannelKind,
        session_id: Uuid,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(core) = weak.upgrade() else {
                    return;
                };
                match event {
                    ChannelEvent::Text(text) => core.handle_message(kind, session_id, text.as_bytes()),
                    ChannelEvent::Binary(data) => core.handle_message(kind, session_id, &data),
                    ChannelEvent::Closed => break,
                }
            }

            if let Some(core) = weak.upgrade() {
                core.handle_close(kind, session_id);
            }
        });
    }

    fn handle_message(&self, kind: ChannelKind, session_id: Uuid, data: &[u8]) {
        if kind != ChannelKind::Relay {
            debug!("Ignoring {} byte message on {} channel", data.len(), kind);
            return;
        }

        let message = match RelayMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping unparseable relay message: {}", e);
                return;
            }
        };

        let inner = self.lock();
        // Only a relay that is still open can report the final result
        if inner.session_id == Some(session_id) && inner.relay.is_some() {
            if message.is_final() {
                info!("Final result received for session {}", session_id);
            }
            self.final_result.send_replace(message.is_final());
        }

        let RelayMessage {
            payload,
            received_at,
        } = message;
        self.emit(&inner, |session| TranscriberEvent::DataReceived {
            session,
            payload,
            received_at,
        });
    }

    fn handle_close(&self, kind: ChannelKind, session_id: Uuid) {
        let mut inner = self.lock();
        if inner.state == State::Recording && inner.session_id == Some(session_id) {
            warn!(
                "{} channel closed while recording; canceling session {}",
                kind, session_id
            );
            self.cancel_recording(&mut inner);
        } else {
            debug!("{} channel closed ({})", kind, inner.state);
        }
    }

    fn cancel_recording(&self, inner: &mut Inner) {
        inner.stop_capture();
        inner.state = State::Ready;
        info!("Recording canceled");
        self.emit(inner, |session| TranscriberEvent::Canceled { session });
    }

    fn spawn_export_timer(self: &Arc<Self>, session_id: Uuid) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.export_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(core) = weak.upgrade() else {
                    break;
                };
                let mut inner = core.lock();
                if inner.state != State::Recording || inner.session_id != Some(session_id) {
                    break;
                }
                inner.push_chunk();
            }
        })
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            state: State::Uninitialized,
            init: None,
            init_epoch: 0,
            stream: None,
            device: None,
            capture: None,
            session_id: None,
            upload: None,
            relay: None,
            export_timer: None,
            last_error: None,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            state: self.state,
            session_id: self.session_id,
            device: self.device.clone(),
        }
    }

    /// Halt the adapter and cancel the export timer
    fn stop_capture(&mut self) {
        if let Some(timer) = self.export_timer.take() {
            timer.abort();
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
    }

    /// Export one chunk and upload it; empty chunks are dropped
    fn push_chunk(&mut self) -> bool {
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        let chunk = capture.export();
        if chunk.is_empty() {
            return false;
        }

        let Some(upload) = self.upload.as_ref() else {
            return false;
        };
        let size = chunk.len();
        match upload.send(chunk) {
            Ok(()) => {
                debug!("Uploaded {} byte audio chunk", size);
                true
            }
            Err(e) => {
                warn!("Failed to upload audio chunk: {:#}", e);
                false
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.export_timer.take() {
            timer.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop_tracks();
        }
    }
}

/// Resolves once the relay reports a final result
async fn wait_for_final(mut final_result: watch::Receiver<bool>) {
    loop {
        let done = *final_result.borrow_and_update();
        if done {
            return;
        }
        if final_result.changed().await.is_err() {
            return;
        }
    }
}

/// Completion of [`Transcriber::start`]
///
/// Channel negotiation runs in its own task; awaiting this yields its outcome.
#[derive(Debug)]
#[must_use = "start() only reports channel failures through this future"]
pub struct PendingStart {
    task: JoinHandle<Result<()>>,
}

impl Future for PendingStart {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(TranscriberError::Channel(format!(
                    "start task failed: {}",
                    e
                )))
            })
        })
    }
}
