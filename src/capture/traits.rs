//! Capture trait definitions
//!
//! Platform-agnostic interfaces for the two live sources a session records.

use super::frame::VideoFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Frame rate requested from the display picker
pub const SCREEN_FRAME_RATE: u32 = 30;

/// Camera resolution requested from the camera picker
pub const CAMERA_RESOLUTION: Resolution = Resolution {
    width: 640,
    height: 480,
};

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which of the two session sources a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The captured screen, window or display
    Screen,
    /// The captured camera, with optional microphone
    Camera,
}

/// Handle to one live audio track carried by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: Uuid,
    pub label: String,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }
}

/// Capture acquisition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No source selected")]
    NoSourceSelected,

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("{0:?} source never produced a frame")]
    SourceStalled(SourceKind),
}

/// Constraints for the display picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRequest {
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub audio: bool,
}

impl ScreenRequest {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            frame_rate: SCREEN_FRAME_RATE,
            audio: false,
        }
    }
}

/// Constraints for the camera picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub resolution: Resolution,
    pub audio: bool,
}

impl CameraRequest {
    pub fn new(include_microphone: bool) -> Self {
        Self {
            resolution: CAMERA_RESOLUTION,
            audio: include_microphone,
        }
    }
}

/// A live source exclusively owned by one recording session
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Human-readable label, for logs
    fn label(&self) -> String;

    /// Resolution negotiated with the platform, when it reports one
    fn video_resolution(&self) -> Option<Resolution>;

    /// Audio tracks carried alongside the video
    fn audio_tracks(&self) -> Vec<AudioTrack>;

    /// The most recently decoded frame, if any
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Resolves once the first frame is available
    async fn first_frame(&self);

    /// Stop every constituent track. Safe to call more than once.
    fn stop(&self);
}

/// Platform pickers for the two sources
#[async_trait]
pub trait CapturePicker: Send + Sync {
    async fn acquire_screen(
        &self,
        request: ScreenRequest,
    ) -> Result<Box<dyn MediaSource>, CaptureError>;

    async fn acquire_camera(
        &self,
        request: CameraRequest,
    ) -> Result<Box<dyn MediaSource>, CaptureError>;
}
