//! Stream encoding
//!
//! The encoder consumes the composite video stream plus optional audio and
//! delivers encoded fragments asynchronously.

pub mod ffmpeg;
pub mod options;
pub mod traits;

pub use ffmpeg::FfmpegEncoderFactory;
pub use options::{negotiate_options, EncoderOptions, CODEC_PREFERENCES, DEFAULT_VIDEO_BITRATE};
pub use traits::{
    EncoderError, EncoderEvent, EncoderEvents, EncoderFactory, EncoderState, OutputStream,
    StreamEncoder, TaggedEncoderEvent, VideoTrack,
};
