//! Recording errors

use super::state::Phase;
use crate::capture::CaptureError;
use thiserror::Error;

/// Why a session ended in [`Phase::Error`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("{0}")]
    Capture(#[from] CaptureError),

    #[error("Could not start encoder: {0}")]
    Pipeline(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("No data captured")]
    NoDataCaptured,

    #[error("Empty output")]
    EmptyOutput,
}

/// Errors returned to callers of the recorder commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("A recording session is already active ({0:?})")]
    SessionActive(Phase),

    #[error("Cannot {action} while {phase:?}")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error("Recording failed: {0}")]
    Failed(#[from] SessionFailure),

    #[error("Recorder is not running")]
    ControllerClosed,
}

pub type RecorderResult<T> = Result<T, RecorderError>;
