//! Resources owned by the active session

use crate::capture::{MediaSource, VideoFrame};
use crate::compositor::FrameCompositor;
use crate::encoder::StreamEncoder;
use tokio::task::JoinHandle;
use tokio::time::Interval;

/// Counts the frame periods due for the recorded time, so the constant-rate
/// output stays as long as the session even when ticks are missed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePacer {
    frame_rate: u32,
    claimed: u64,
}

impl FramePacer {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            claimed: 0,
        }
    }

    /// Periods due after `elapsed_ms` of recorded time, the first one at zero
    pub fn due(&self, elapsed_ms: u64) -> u64 {
        (elapsed_ms * self.frame_rate as u64 + 500) / 1000 + 1
    }

    /// Claim every period due by `elapsed_ms` that is not claimed yet
    pub fn claim(&mut self, elapsed_ms: u64) -> u32 {
        let due = self.due(elapsed_ms);
        let owed = due.saturating_sub(self.claimed);
        self.claimed = self.claimed.max(due);
        owed.min(u32::MAX as u64) as u32
    }

    pub fn claimed(&self) -> u64 {
        self.claimed
    }
}

/// A composite frame finished on the blocking pool
pub struct RenderedFrame {
    pub compositor: FrameCompositor,
    pub frame: VideoFrame,
    /// Frame periods this frame stands for
    pub periods: u32,
}

/// Everything a session acquires between `begin()` and its terminal phase.
///
/// Sources are exclusively owned here once acquired.
#[derive(Default)]
pub struct SessionResources {
    pub primary: Option<Box<dyn MediaSource>>,
    pub secondary: Option<Box<dyn MediaSource>>,
    pub compositor: Option<FrameCompositor>,
    /// Frame being composited; holds the compositor until it finishes
    pub rendering: Option<JoinHandle<RenderedFrame>>,
    pub pacer: FramePacer,
    pub frame_loop: Option<Interval>,
    pub encoder: Option<Box<dyn StreamEncoder>>,
    /// Last composite frame, kept past release for the poster image
    pub last_frame: Option<VideoFrame>,
}

impl SessionResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any resource is still held
    pub fn is_active(&self) -> bool {
        self.primary.is_some()
            || self.secondary.is_some()
            || self.compositor.is_some()
            || self.rendering.is_some()
            || self.frame_loop.is_some()
            || self.encoder.is_some()
    }

    /// Stop compositing; sources and encoder stay alive
    pub fn halt_frame_loop(&mut self) {
        if self.frame_loop.take().is_some() {
            tracing::debug!("Frame loop halted");
        }
    }

    /// Release every resource. Idempotent.
    ///
    /// The frame loop is cancelled before sources are stopped so no tick
    /// can draw from a released source.
    pub fn release(&mut self) {
        if !self.is_active() {
            return;
        }

        self.halt_frame_loop();
        self.compositor = None;
        // An unfinished frame is detached and discarded
        self.rendering = None;

        if let Some(mut encoder) = self.encoder.take() {
            if encoder.state() != crate::encoder::EncoderState::Inactive {
                encoder.stop();
            }
        }

        for source in [self.primary.take(), self.secondary.take()].into_iter().flatten() {
            tracing::debug!("Releasing {}", source.label());
            source.stop();
        }

        tracing::info!("Session resources released");
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}
