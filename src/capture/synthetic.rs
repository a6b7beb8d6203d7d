//! Synthetic capture sources
//!
//! Animated test patterns standing in for the platform pickers. Used by the
//! headless binary and by tests, which inspect the [`SourceProbe`] handles
//! to verify resource release.

use super::frame::VideoFrame;
use super::traits::{
    AudioTrack, CameraRequest, CaptureError, CapturePicker, MediaSource, Resolution,
    ScreenRequest, SourceKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How the picker answers one kind of request
#[derive(Debug, Clone)]
pub enum SyntheticBehavior {
    /// Grant a source that produces frames immediately
    Grant,
    /// Fail the request with the given error
    Deny(CaptureError),
    /// Grant a source that never produces a frame
    NeverReady,
}

/// Observes the lifecycle of a synthetic source after it was handed out
#[derive(Debug, Clone)]
pub struct SourceProbe {
    pub kind: SourceKind,
    state: Arc<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
    frames_read: AtomicUsize,
}

impl SourceProbe {
    /// Whether every track of the source has been stopped
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Number of `stop()` calls that actually released tracks
    pub fn stop_calls(&self) -> usize {
        self.state.stop_calls.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.state.frames_read.load(Ordering::SeqCst)
    }
}

/// Picker that hands out test-pattern sources
pub struct SyntheticPicker {
    screen: SyntheticBehavior,
    camera: SyntheticBehavior,
    report_resolution: bool,
    screen_resolution: Option<Resolution>,
    camera_resolution: Option<Resolution>,
    screen_requests: Mutex<Vec<ScreenRequest>>,
    probes: Mutex<Vec<SourceProbe>>,
}

impl Default for SyntheticPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticPicker {
    pub fn new() -> Self {
        Self {
            screen: SyntheticBehavior::Grant,
            camera: SyntheticBehavior::Grant,
            report_resolution: true,
            screen_resolution: None,
            camera_resolution: None,
            screen_requests: Mutex::new(Vec::new()),
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_screen(mut self, behavior: SyntheticBehavior) -> Self {
        self.screen = behavior;
        self
    }

    pub fn with_camera(mut self, behavior: SyntheticBehavior) -> Self {
        self.camera = behavior;
        self
    }

    /// Grant screen sources at this resolution instead of the requested one
    pub fn with_screen_resolution(mut self, resolution: Resolution) -> Self {
        self.screen_resolution = Some(resolution);
        self
    }

    pub fn with_camera_resolution(mut self, resolution: Resolution) -> Self {
        self.camera_resolution = Some(resolution);
        self
    }

    /// Hand out screen sources that do not report a negotiated resolution
    pub fn without_reported_resolution(mut self) -> Self {
        self.report_resolution = false;
        self
    }

    /// Screen requests received so far
    pub fn screen_requests(&self) -> Vec<ScreenRequest> {
        self.screen_requests.lock().clone()
    }

    /// Probes for every source handed out so far
    pub fn probes(&self) -> Vec<SourceProbe> {
        self.probes.lock().clone()
    }

    fn grant(
        &self,
        kind: SourceKind,
        behavior: &SyntheticBehavior,
        resolution: Resolution,
        audio: bool,
    ) -> Result<Box<dyn MediaSource>, CaptureError> {
        let ready = match behavior {
            SyntheticBehavior::Deny(err) => return Err(err.clone()),
            SyntheticBehavior::Grant => true,
            SyntheticBehavior::NeverReady => false,
        };

        let state = Arc::new(ProbeState::default());
        self.probes.lock().push(SourceProbe {
            kind,
            state: state.clone(),
        });

        let audio_tracks = if audio {
            vec![AudioTrack::new("Synthetic microphone")]
        } else {
            Vec::new()
        };

        let reported = match kind {
            SourceKind::Screen if !self.report_resolution => None,
            _ => Some(resolution),
        };

        Ok(Box::new(TestPatternSource {
            kind,
            resolution,
            reported,
            audio_tracks,
            ready,
            started: Instant::now(),
            cache: Mutex::new(None),
            state,
        }))
    }
}

#[async_trait]
impl CapturePicker for SyntheticPicker {
    async fn acquire_screen(
        &self,
        request: ScreenRequest,
    ) -> Result<Box<dyn MediaSource>, CaptureError> {
        self.screen_requests.lock().push(request);
        let resolution = self.screen_resolution.unwrap_or(request.resolution);
        self.grant(SourceKind::Screen, &self.screen, resolution, request.audio)
    }

    async fn acquire_camera(
        &self,
        request: CameraRequest,
    ) -> Result<Box<dyn MediaSource>, CaptureError> {
        let resolution = self.camera_resolution.unwrap_or(request.resolution);
        self.grant(SourceKind::Camera, &self.camera, resolution, request.audio)
    }
}

/// Frames per second of the pattern animation
const PATTERN_FPS: u128 = 30;

struct TestPatternSource {
    kind: SourceKind,
    resolution: Resolution,
    reported: Option<Resolution>,
    audio_tracks: Vec<AudioTrack>,
    ready: bool,
    started: Instant,
    cache: Mutex<Option<(u128, VideoFrame)>>,
    state: Arc<ProbeState>,
}

impl TestPatternSource {
    fn render(&self, index: u128) -> VideoFrame {
        let Resolution { width, height } = self.resolution;
        let base: [u8; 3] = match self.kind {
            SourceKind::Screen => [32, 48, 96],
            SourceKind::Camera => [200, 120, 40],
        };

        // A bright bar sweeps across the frame, one column band per frame
        let band = (width / 16).max(1);
        let bar_x = ((index as u64 * band as u64) % width.max(1) as u64) as u32;

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let in_bar = x >= bar_x && x < bar_x + band;
                let shade = ((y * 255) / height.max(1)) as u8;
                if in_bar {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    data.extend_from_slice(&[
                        base[0].saturating_add(shade / 4),
                        base[1],
                        base[2].saturating_add(shade / 4),
                        255,
                    ]);
                }
            }
        }

        VideoFrame::from_rgba(width, height, data)
            .unwrap_or_else(|| VideoFrame::solid(width, height, [0, 0, 0, 255]))
    }
}

#[async_trait]
impl MediaSource for TestPatternSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn label(&self) -> String {
        format!("Synthetic {:?} {}", self.kind, self.resolution)
    }

    fn video_resolution(&self) -> Option<Resolution> {
        self.reported
    }

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        if self.state.stopped.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.audio_tracks.clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.ready || self.state.stopped.load(Ordering::SeqCst) {
            return None;
        }

        let index = self.started.elapsed().as_millis() * PATTERN_FPS / 1000;
        let mut cache = self.cache.lock();
        let frame = match cache.as_ref() {
            Some((cached, frame)) if *cached == index => frame.clone(),
            _ => {
                let frame = self.render(index);
                *cache = Some((index, frame.clone()));
                frame
            }
        };

        self.state.frames_read.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    async fn first_frame(&self) {
        if !self.ready {
            std::future::pending::<()>().await;
        }
    }

    fn stop(&self) {
        if !self.state.stopped.swap(true, Ordering::SeqCst) {
            self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.cache.lock().take();
            tracing::debug!("Stopped {}", self.label());
        }
    }
}
