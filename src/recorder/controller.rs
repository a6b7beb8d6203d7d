//! Recording session controller
//!
//! Owns the single recording session. UI-facing calls go through a cloneable
//! [`RecorderHandle`]; the controller task serializes them with encoder
//! events, frame ticks and the elapsed-time display timer, feeds them to the
//! [`SessionMachine`] and executes the effects it returns.

use super::error::{RecorderError, RecorderResult, SessionFailure};
use super::machine::{Effect, Now, SessionEvent, SessionMachine};
use super::resources::{FramePacer, RenderedFrame, SessionResources};
use super::state::{Phase, StatusUpdate};
use crate::capture::{
    acquire_camera, acquire_screen, CaptureError, CapturePicker, MediaSource, SourceKind,
    VideoFrame,
};
use crate::compositor::{FrameCompositor, SurfaceFactory};
use crate::config::ControllerConfig;
use crate::delivery::{OutputSink, Recording};
use crate::encoder::{
    negotiate_options, EncoderError, EncoderEvent, EncoderEvents, EncoderFactory, OutputStream,
    TaggedEncoderEvent, VideoTrack,
};
use crate::overlay::OverlayGeometry;
use crate::settings::{OverlayPosition, OverlayShape, OverlaySize, Quality, Settings, SettingsStore};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

/// External collaborators of the controller
pub struct Collaborators {
    pub picker: Arc<dyn CapturePicker>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub settings: SettingsStore,
    pub sink: Arc<dyn OutputSink>,
}

/// A single settings field change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    OverlayPosition(OverlayPosition),
    OverlaySize(OverlaySize),
    OverlayShape(OverlayShape),
    Quality(Quality),
    IncludeMicrophone(bool),
}

impl SettingsChange {
    pub fn apply(self, mut settings: Settings) -> Settings {
        match self {
            SettingsChange::OverlayPosition(v) => settings.overlay_position = v,
            SettingsChange::OverlaySize(v) => settings.overlay_size = v,
            SettingsChange::OverlayShape(v) => settings.overlay_shape = v,
            SettingsChange::Quality(v) => settings.quality = v,
            SettingsChange::IncludeMicrophone(v) => settings.include_microphone = v,
        }
        settings
    }
}

type Reply<T> = oneshot::Sender<RecorderResult<T>>;

enum Command {
    Begin(Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    TogglePause(Reply<Phase>),
    Stop(Reply<()>),
    ChangeSettings(SettingsChange, Reply<Settings>),
    Elapsed(Reply<u64>),
}

/// Snapshots readable without a round trip to the controller task
struct Shared {
    status: RwLock<StatusUpdate>,
    settings: RwLock<Settings>,
}

/// Cloneable handle to a running [`RecordingController`]
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    status_tx: broadcast::Sender<StatusUpdate>,
    preview: watch::Receiver<Option<VideoFrame>>,
}

impl RecorderHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> RecorderResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| RecorderError::ControllerClosed)?;
        rx.await.map_err(|_| RecorderError::ControllerClosed)?
    }

    /// Start a session. Resolves once recording has begun or the session
    /// has failed; failures are also published as an Error status.
    pub async fn begin(&self) -> RecorderResult<()> {
        self.request(Command::Begin).await
    }

    pub async fn pause(&self) -> RecorderResult<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> RecorderResult<()> {
        self.request(Command::Resume).await
    }

    /// Pause when recording, resume when paused. Returns the new phase.
    pub async fn toggle_pause(&self) -> RecorderResult<Phase> {
        self.request(Command::TogglePause).await
    }

    /// Request the end of the session. The recording is delivered
    /// asynchronously once the encoder has flushed.
    pub async fn stop(&self) -> RecorderResult<()> {
        self.request(Command::Stop).await
    }

    pub async fn elapsed_ms(&self) -> RecorderResult<u64> {
        self.request(Command::Elapsed).await
    }

    pub async fn update_settings(&self, change: SettingsChange) -> RecorderResult<Settings> {
        self.request(|reply| Command::ChangeSettings(change, reply)).await
    }

    pub async fn set_overlay_position(&self, position: OverlayPosition) -> RecorderResult<Settings> {
        self.update_settings(SettingsChange::OverlayPosition(position)).await
    }

    pub async fn set_overlay_size(&self, size: OverlaySize) -> RecorderResult<Settings> {
        self.update_settings(SettingsChange::OverlaySize(size)).await
    }

    pub async fn set_overlay_shape(&self, shape: OverlayShape) -> RecorderResult<Settings> {
        self.update_settings(SettingsChange::OverlayShape(shape)).await
    }

    pub async fn set_quality(&self, quality: Quality) -> RecorderResult<Settings> {
        self.update_settings(SettingsChange::Quality(quality)).await
    }

    pub async fn set_include_microphone(&self, include: bool) -> RecorderResult<Settings> {
        self.update_settings(SettingsChange::IncludeMicrophone(include)).await
    }

    pub fn settings(&self) -> Settings {
        *self.shared.settings.read()
    }

    /// Last published status
    pub fn status(&self) -> StatusUpdate {
        self.shared.status.read().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.status.read().phase
    }

    /// Subscribe to status updates
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    /// Live camera frames while a session is running; `None` otherwise
    pub fn camera_preview(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.preview.clone()
    }
}

/// Drives the one recording session
pub struct RecordingController {
    config: ControllerConfig,
    picker: Arc<dyn CapturePicker>,
    encoders: Arc<dyn EncoderFactory>,
    surfaces: Arc<dyn SurfaceFactory>,
    store: SettingsStore,
    sink: Arc<dyn OutputSink>,

    settings: Settings,
    machine: SessionMachine,
    resources: SessionResources,
    session_id: Uuid,
    failure: Option<SessionFailure>,
    delivery_error: Option<String>,

    epoch: Instant,
    display_timer: Option<Interval>,
    encoder_tx: mpsc::UnboundedSender<TaggedEncoderEvent>,
    encoder_rx: mpsc::UnboundedReceiver<TaggedEncoderEvent>,

    shared: Arc<Shared>,
    status_tx: broadcast::Sender<StatusUpdate>,
    preview_tx: watch::Sender<Option<VideoFrame>>,
}

impl RecordingController {
    /// Load persisted settings and start the controller task.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(collaborators: Collaborators, config: ControllerConfig) -> RecorderHandle {
        let settings = collaborators.settings.load();
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (status_tx, _) = broadcast::channel(100);
        let (encoder_tx, encoder_rx) = mpsc::unbounded_channel();
        let (preview_tx, preview) = watch::channel(None);
        let shared = Arc::new(Shared {
            status: RwLock::new(StatusUpdate::default()),
            settings: RwLock::new(settings),
        });

        let controller = Self {
            config,
            picker: collaborators.picker,
            encoders: collaborators.encoders,
            surfaces: collaborators.surfaces,
            store: collaborators.settings,
            sink: collaborators.sink,
            settings,
            machine: SessionMachine::new(),
            resources: SessionResources::new(),
            session_id: Uuid::nil(),
            failure: None,
            delivery_error: None,
            epoch: Instant::now(),
            display_timer: None,
            encoder_tx,
            encoder_rx,
            shared: shared.clone(),
            status_tx: status_tx.clone(),
            preview_tx,
        };
        tokio::spawn(controller.run(command_rx));

        RecorderHandle {
            commands: command_tx,
            shared,
            status_tx,
            preview,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Recording controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(tagged) = self.encoder_rx.recv() => {
                    self.handle_encoder_event(tagged).await;
                }
                _ = tick(&mut self.resources.frame_loop) => {
                    self.schedule_frame();
                }
                Some(rendered) = next_rendered(&mut self.resources.rendering) => {
                    self.finish_frame(rendered);
                }
                _ = tick(&mut self.display_timer) => {
                    self.publish_elapsed();
                }
            }
        }

        self.resources.release();
        tracing::info!("Recording controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Begin(reply) => {
                let result = self.begin().await;
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                let result = self.dispatch(SessionEvent::Pause).await;
                let _ = reply.send(result);
            }
            Command::Resume(reply) => {
                let result = self.dispatch(SessionEvent::Resume).await;
                let _ = reply.send(result);
            }
            Command::TogglePause(reply) => {
                let event = if self.machine.phase() == Phase::Paused {
                    SessionEvent::Resume
                } else {
                    SessionEvent::Pause
                };
                let result = self.dispatch(event).await.map(|_| self.machine.phase());
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let result = self.dispatch(SessionEvent::Stop).await;
                let _ = reply.send(result);
            }
            Command::ChangeSettings(change, reply) => {
                self.settings = change.apply(self.settings);
                self.store.save(&self.settings);
                *self.shared.settings.write() = self.settings;
                tracing::debug!("Settings changed: {:?}", change);
                let _ = reply.send(Ok(self.settings));
            }
            Command::Elapsed(reply) => {
                let _ = reply.send(Ok(self.machine.elapsed_ms(self.now().ms)));
            }
        }
    }

    async fn begin(&mut self) -> RecorderResult<()> {
        if self.machine.phase() == Phase::Idle {
            self.session_id = Uuid::new_v4();
            self.failure = None;
            self.resources.last_frame = None;
            tracing::info!("Beginning recording session {}", self.session_id);
        }

        self.dispatch(SessionEvent::Begin).await?;

        match self.failure.take() {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    async fn handle_encoder_event(&mut self, tagged: TaggedEncoderEvent) {
        if tagged.session != self.session_id {
            tracing::debug!("Ignoring encoder event from stale session {}", tagged.session);
            return;
        }

        let event = match tagged.event {
            EncoderEvent::Fragment(data) => {
                tracing::trace!("Fragment of {} bytes", data.len());
                SessionEvent::Fragment(data)
            }
            EncoderEvent::Stopped => SessionEvent::EncoderStopped,
            EncoderEvent::Failed(message) => SessionEvent::EncoderFailed(message),
        };

        if let Err(e) = self.dispatch(event).await {
            tracing::warn!("Encoder event rejected: {}", e);
        }
    }

    /// Feed one event to the machine and run its effects, including the
    /// effects of any follow-up events they produce.
    async fn dispatch(&mut self, event: SessionEvent) -> RecorderResult<()> {
        let now = self.now();
        let mut queue: VecDeque<Effect> = self.machine.handle(event, now)?.into();

        while let Some(effect) = queue.pop_front() {
            for follow_up in self.execute(effect).await {
                let now = self.now();
                match self.machine.handle(follow_up, now) {
                    Ok(effects) => queue.extend(effects),
                    Err(e) => tracing::warn!("Follow-up event rejected: {}", e),
                }
            }
        }

        Ok(())
    }

    async fn execute(&mut self, effect: Effect) -> Vec<SessionEvent> {
        match effect {
            Effect::Notify { phase, message } => {
                self.notify(phase, message);
                Vec::new()
            }
            Effect::AcquireSources => self.acquire_sources().await,
            Effect::StartPipeline => match self.start_pipeline() {
                Ok(()) => vec![SessionEvent::PipelineStarted],
                Err(e) => vec![SessionEvent::PipelineFailed(e.to_string())],
            },
            Effect::PauseEncoder => {
                self.settle_frame().await;
                if let Some(encoder) = self.resources.encoder.as_mut() {
                    encoder.pause();
                }
                Vec::new()
            }
            Effect::ResumeEncoder => {
                if let Some(encoder) = self.resources.encoder.as_mut() {
                    encoder.resume();
                }
                Vec::new()
            }
            Effect::HaltFrameLoop => {
                self.resources.halt_frame_loop();
                Vec::new()
            }
            Effect::StopEncoder => {
                self.settle_frame().await;
                if let Some(encoder) = self.resources.encoder.as_mut() {
                    encoder.stop();
                }
                Vec::new()
            }
            Effect::Cleanup => {
                self.display_timer = None;
                self.resources.release();
                self.preview_tx.send_replace(None);
                Vec::new()
            }
            Effect::Failed(failure) => {
                self.failure = Some(failure);
                Vec::new()
            }
            Effect::Deliver(recording) => {
                self.deliver(recording).await;
                Vec::new()
            }
        }
    }

    async fn acquire_sources(&mut self) -> Vec<SessionEvent> {
        let settings = self.settings;

        match acquire_screen(self.picker.as_ref(), settings.quality).await {
            Ok(source) => self.resources.primary = Some(source),
            Err(e) => return vec![SessionEvent::AcquisitionFailed(e)],
        }
        match acquire_camera(self.picker.as_ref(), settings.include_microphone).await {
            Ok(source) => self.resources.secondary = Some(source),
            Err(e) => return vec![SessionEvent::AcquisitionFailed(e)],
        }

        match (self.resources.primary.as_deref(), self.resources.secondary.as_deref()) {
            (Some(primary), Some(secondary)) => {
                wait_for_first_frames(primary, secondary, self.config.ready_timeout()).await
            }
            _ => Vec::new(),
        }
    }

    fn start_pipeline(&mut self) -> Result<(), EncoderError> {
        let resolution = self
            .resources
            .primary
            .as_ref()
            .and_then(|source| source.video_resolution())
            .unwrap_or_else(|| {
                tracing::warn!("Screen source reported no resolution, using quality preset");
                self.settings.quality.resolution()
            });

        let surface = self.surfaces.create(resolution.width, resolution.height);
        self.resources.compositor = Some(FrameCompositor::new(surface));

        let mut frame_loop = interval(self.config.frame_period());
        frame_loop.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.resources.frame_loop = Some(frame_loop);
        self.resources.pacer = FramePacer::new(self.config.frame_rate);

        let camera_audio = self
            .resources
            .secondary
            .as_ref()
            .map(|source| source.audio_tracks())
            .unwrap_or_default();
        let stream = OutputStream::combine(
            VideoTrack {
                width: resolution.width,
                height: resolution.height,
                frame_rate: self.config.frame_rate,
            },
            camera_audio,
            self.settings.include_microphone,
        );
        let options = negotiate_options(self.encoders.as_ref(), self.config.video_bits_per_second);
        let events = EncoderEvents::new(self.session_id, self.encoder_tx.clone());

        let mut encoder = self.encoders.create(stream, options, events)?;
        encoder.start(self.config.timeslice())?;
        tracing::info!(
            "Pipeline started at {} ({:?})",
            resolution,
            encoder.mime_type()
        );
        self.resources.encoder = Some(encoder);

        Ok(())
    }

    /// Frame tick: refresh the preview and composite a frame for the
    /// periods owed since the last one. Nothing is claimed while the
    /// previous frame is still being drawn.
    fn schedule_frame(&mut self) {
        let elapsed = self.machine.elapsed_ms(self.now().ms);
        let resources = &mut self.resources;

        let secondary = resources.secondary.as_ref().and_then(|s| s.latest_frame());
        self.preview_tx.send_replace(secondary.clone());

        if resources.rendering.is_some() {
            return;
        }
        let periods = resources.pacer.claim(elapsed);
        if periods == 0 {
            return;
        }
        let Some(mut compositor) = resources.compositor.take() else {
            return;
        };

        let primary = resources.primary.as_ref().and_then(|s| s.latest_frame());
        let geometry = OverlayGeometry::compute(&self.settings, compositor.width(), compositor.height());

        resources.rendering = Some(tokio::task::spawn_blocking(move || {
            compositor.draw_frame(primary.as_ref(), secondary.as_ref(), &geometry);
            RenderedFrame {
                frame: compositor.capture(),
                compositor,
                periods,
            }
        }));
    }

    /// Feed a finished frame to the encoder and take the compositor back
    fn finish_frame(&mut self, rendered: RenderedFrame) {
        let RenderedFrame {
            compositor,
            frame,
            periods,
        } = rendered;

        if let Some(encoder) = self.resources.encoder.as_mut() {
            encoder.write_repeated(&frame, periods);
        }
        self.resources.compositor = Some(compositor);
        self.resources.last_frame = Some(frame);
    }

    /// Wait for the frame in flight, if any, and write it
    async fn settle_frame(&mut self) {
        if self.resources.rendering.is_none() {
            return;
        }
        if let Some(rendered) = next_rendered(&mut self.resources.rendering).await {
            self.finish_frame(rendered);
        }
    }

    async fn deliver(&mut self, mut recording: Recording) {
        recording.poster = self.resources.last_frame.take();
        let filename = recording.suggested_filename.clone();
        let sink = self.sink.clone();

        match tokio::task::spawn_blocking(move || sink.deliver(recording)).await {
            Ok(Ok(delivered)) => tracing::info!("Recording delivered: {:?}", delivered),
            Ok(Err(e)) => {
                tracing::error!("Failed to deliver {}: {}", filename, e);
                self.delivery_error = Some(e.to_string());
            }
            Err(e) => {
                tracing::error!("Delivery task failed: {}", e);
                self.delivery_error = Some(e.to_string());
            }
        }
    }

    fn notify(&mut self, phase: Phase, message: Option<String>) {
        self.display_timer = match phase {
            Phase::Recording => {
                let period = self.config.display_interval();
                Some(interval_at(Instant::now() + period, period))
            }
            _ => None,
        };

        let message = match (phase, self.delivery_error.take()) {
            (Phase::Complete, Some(error)) => Some(match message {
                Some(filename) => format!("{} (not saved: {})", filename, error),
                None => format!("not saved: {}", error),
            }),
            _ => message,
        };

        self.publish(StatusUpdate::new(
            phase,
            self.machine.elapsed_ms(self.now().ms),
            message,
        ));
    }

    fn publish_elapsed(&mut self) {
        if self.machine.phase() == Phase::Recording {
            self.publish(StatusUpdate::new(
                Phase::Recording,
                self.machine.elapsed_ms(self.now().ms),
                None,
            ));
        }
    }

    fn publish(&self, status: StatusUpdate) {
        tracing::debug!("Status: {} [{}]", status.text(), status.elapsed);
        *self.shared.status.write() = status.clone();
        let _ = self.status_tx.send(status);
    }

    fn now(&self) -> Now {
        Now::new(self.epoch.elapsed().as_millis() as u64, Utc::now())
    }
}

/// Completes when the timer fires; never completes without a timer
async fn tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

/// Completes with the frame in flight; never completes when there is none.
/// The slot is cleared once the frame has been taken.
async fn next_rendered(slot: &mut Option<JoinHandle<RenderedFrame>>) -> Option<RenderedFrame> {
    let Some(handle) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *slot = None;
    match result {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            tracing::error!("Compositing task failed: {}", e);
            None
        }
    }
}

/// Join the two first-frame signals, bounded by `timeout`
async fn wait_for_first_frames(
    primary: &dyn MediaSource,
    secondary: &dyn MediaSource,
    timeout: Duration,
) -> Vec<SessionEvent> {
    let mut screen_ready = false;
    let mut camera_ready = false;

    let timed_out = tokio::time::timeout(timeout, async {
        tokio::join!(
            async {
                primary.first_frame().await;
                screen_ready = true;
            },
            async {
                secondary.first_frame().await;
                camera_ready = true;
            },
        )
    })
    .await
    .is_err();

    let mut events = Vec::new();
    if screen_ready {
        events.push(SessionEvent::SourceReady(SourceKind::Screen));
    }
    if camera_ready {
        events.push(SessionEvent::SourceReady(SourceKind::Camera));
    }
    if timed_out {
        let stalled = if screen_ready {
            SourceKind::Camera
        } else {
            SourceKind::Screen
        };
        tracing::warn!("{:?} source produced no frame within {:?}", stalled, timeout);
        events.push(SessionEvent::AcquisitionFailed(CaptureError::SourceStalled(stalled)));
    }
    events
}
