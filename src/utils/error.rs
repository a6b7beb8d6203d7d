//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::CaptureError;
use crate::delivery::DeliveryError;
use crate::encoder::EncoderError;
use crate::recorder::{RecorderError, SessionFailure};
use crate::settings::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] StoreError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Error response for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

fn capture_code(error: &CaptureError) -> &'static str {
    match error {
        CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
        CaptureError::NoSourceSelected => "NO_SOURCE_SELECTED",
        CaptureError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
        CaptureError::SourceStalled(_) => "SOURCE_STALLED",
    }
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Settings(_) => "SETTINGS_ERROR",
            AppError::Capture(e) => capture_code(e),
            AppError::Encoder(_) => "ENCODER_ERROR",
            AppError::Recording(RecorderError::Failed(SessionFailure::Capture(e))) => {
                capture_code(e)
            }
            AppError::Recording(RecorderError::Failed(SessionFailure::NoDataCaptured)) => {
                "NO_DATA_CAPTURED"
            }
            AppError::Recording(RecorderError::SessionActive(_)) => "SESSION_ACTIVE",
            AppError::Recording(RecorderError::InvalidTransition { .. }) => "INVALID_STATE",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Delivery(_) => "DELIVERY_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
