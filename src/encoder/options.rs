//! Encoder option negotiation

use super::traits::EncoderFactory;

/// Target video bitrate in bits per second
pub const DEFAULT_VIDEO_BITRATE: u32 = 2_000_000;

/// Container/codec candidates, most preferred first
pub const CODEC_PREFERENCES: [&str; 3] = [
    "video/webm; codecs=vp9,opus",
    "video/webm; codecs=vp8,opus",
    "video/webm",
];

/// Options passed to [`EncoderFactory::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// `None` leaves the format to the encoder's defaults
    pub mime_type: Option<String>,
    pub video_bits_per_second: u32,
}

/// Pick the first supported candidate, or fall back to encoder defaults
pub fn negotiate_options(factory: &dyn EncoderFactory, video_bits_per_second: u32) -> EncoderOptions {
    let mime_type = CODEC_PREFERENCES
        .iter()
        .find(|candidate| factory.is_type_supported(candidate))
        .map(|candidate| candidate.to_string());

    match &mime_type {
        Some(mime) => tracing::info!("Encoder format negotiated: {}", mime),
        None => tracing::warn!("No preferred encoder format supported, using encoder defaults"),
    }

    EncoderOptions {
        mime_type,
        video_bits_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::traits::{EncoderError, EncoderEvents, OutputStream, StreamEncoder};

    struct Supports(&'static [&'static str]);

    impl EncoderFactory for Supports {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.0.contains(&mime_type)
        }

        fn create(
            &self,
            _stream: OutputStream,
            _options: EncoderOptions,
            _events: EncoderEvents,
        ) -> Result<Box<dyn StreamEncoder>, EncoderError> {
            Err(EncoderError::Unsupported("test factory".to_string()))
        }
    }

    #[test]
    fn test_prefers_vp9() {
        let factory = Supports(&["video/webm", "video/webm; codecs=vp9,opus", "video/webm; codecs=vp8,opus"]);
        let options = negotiate_options(&factory, DEFAULT_VIDEO_BITRATE);
        assert_eq!(options.mime_type.as_deref(), Some("video/webm; codecs=vp9,opus"));
        assert_eq!(options.video_bits_per_second, 2_000_000);
    }

    #[test]
    fn test_falls_through_in_order() {
        let factory = Supports(&["video/webm; codecs=vp8,opus", "video/webm"]);
        assert_eq!(
            negotiate_options(&factory, DEFAULT_VIDEO_BITRATE).mime_type.as_deref(),
            Some("video/webm; codecs=vp8,opus")
        );

        let factory = Supports(&["video/webm"]);
        assert_eq!(
            negotiate_options(&factory, DEFAULT_VIDEO_BITRATE).mime_type.as_deref(),
            Some("video/webm")
        );
    }

    #[test]
    fn test_unsupported_degrades_to_defaults() {
        let factory = Supports(&["video/mp4"]);
        let options = negotiate_options(&factory, DEFAULT_VIDEO_BITRATE);
        assert_eq!(options.mime_type, None);
        assert_eq!(options.video_bits_per_second, DEFAULT_VIDEO_BITRATE);
    }
}
