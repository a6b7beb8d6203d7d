//! Recording session
//!
//! A pure state machine ([`machine`]) decides transitions; the controller
//! task ([`controller`]) owns the session's resources and executes the
//! machine's effects against the capture, compositor, encoder and delivery
//! collaborators.

pub mod controller;
pub mod error;
pub mod machine;
pub mod resources;
pub mod state;

#[cfg(test)]
mod testing;

pub use controller::{Collaborators, RecorderHandle, RecordingController, SettingsChange};
pub use error::{RecorderError, RecorderResult, SessionFailure};
pub use machine::{Effect, Now, ReadyBarrier, SessionEvent, SessionMachine};
pub use resources::{FramePacer, RenderedFrame, SessionResources};
pub use state::{format_elapsed, ElapsedClock, Phase, StatusUpdate};
