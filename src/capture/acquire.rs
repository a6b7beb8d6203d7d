//! One-shot source acquisition

use super::traits::{CameraRequest, CaptureError, CapturePicker, MediaSource, ScreenRequest};
use crate::settings::Quality;

/// Request the screen source at the resolution implied by `quality`
pub async fn acquire_screen(
    picker: &dyn CapturePicker,
    quality: Quality,
) -> Result<Box<dyn MediaSource>, CaptureError> {
    let request = ScreenRequest::new(quality.resolution());
    tracing::debug!(
        "Requesting screen source at {} @ {}fps",
        request.resolution,
        request.frame_rate
    );

    let source = picker.acquire_screen(request).await?;
    tracing::info!(
        "Screen source acquired: {} ({})",
        source.label(),
        source
            .video_resolution()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "resolution not reported".to_string())
    );
    Ok(source)
}

/// Request the camera source, with a microphone track when asked for
pub async fn acquire_camera(
    picker: &dyn CapturePicker,
    include_microphone: bool,
) -> Result<Box<dyn MediaSource>, CaptureError> {
    let request = CameraRequest::new(include_microphone);
    tracing::debug!(
        "Requesting camera source at {} (microphone: {})",
        request.resolution,
        request.audio
    );

    let source = picker.acquire_camera(request).await?;
    tracing::info!(
        "Camera source acquired: {} ({} audio track(s))",
        source.label(),
        source.audio_tracks().len()
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::{SyntheticBehavior, SyntheticPicker};
    use crate::capture::{Resolution, SourceKind};

    #[tokio::test]
    async fn test_screen_request_follows_quality() {
        let picker = SyntheticPicker::new();
        let source = acquire_screen(&picker, Quality::Hd).await.unwrap();
        assert_eq!(source.kind(), SourceKind::Screen);
        assert_eq!(source.video_resolution(), Some(Resolution::new(1280, 720)));
        assert!(source.audio_tracks().is_empty());

        let requests = picker.screen_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].frame_rate, 30);
        assert!(!requests[0].audio);
    }

    #[tokio::test]
    async fn test_camera_microphone_toggle() {
        let picker = SyntheticPicker::new();

        let with_mic = acquire_camera(&picker, true).await.unwrap();
        assert_eq!(with_mic.video_resolution(), Some(Resolution::new(640, 480)));
        assert_eq!(with_mic.audio_tracks().len(), 1);

        let without_mic = acquire_camera(&picker, false).await.unwrap();
        assert!(without_mic.audio_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_denial_propagates() {
        let picker = SyntheticPicker::new()
            .with_camera(SyntheticBehavior::Deny(CaptureError::DeviceUnavailable(
                "no camera".to_string(),
            )));
        let err = acquire_camera(&picker, true).await.err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }
}
