//! Live media capture
//!
//! Acquisition of the screen (primary) and camera (secondary) sources.
//! Platform pickers sit behind [`CapturePicker`]; a synthetic test-pattern
//! picker ships for headless runs and tests.

pub mod acquire;
pub mod frame;
pub mod synthetic;
pub mod traits;

pub use acquire::{acquire_camera, acquire_screen};
pub use frame::VideoFrame;
pub use synthetic::{SourceProbe, SyntheticBehavior, SyntheticPicker};
pub use traits::{
    AudioTrack, CameraRequest, CaptureError, CapturePicker, MediaSource, Resolution,
    ScreenRequest, SourceKind, CAMERA_RESOLUTION, SCREEN_FRAME_RATE,
};
