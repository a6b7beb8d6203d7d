//! Encoder trait definitions

use super::options::EncoderOptions;
use crate::capture::{AudioTrack, VideoFrame};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Encoder errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported encoder configuration: {0}")]
    Unsupported(String),

    #[error("Encoder error: {0}")]
    Runtime(String),
}

/// Video track derived from the composition surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrack {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Combined stream handed to the encoder
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStream {
    pub video: VideoTrack,
    pub audio: Vec<AudioTrack>,
}

impl OutputStream {
    /// Surface video plus, when the microphone is enabled, the camera's audio
    pub fn combine(video: VideoTrack, camera_audio: Vec<AudioTrack>, include_microphone: bool) -> Self {
        let audio = if include_microphone {
            camera_audio
        } else {
            Vec::new()
        };
        Self { video, audio }
    }
}

/// Events an encoder delivers after it was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// An encoded data fragment; may be empty
    Fragment(Vec<u8>),
    /// Encoding has ceased; no further fragments follow
    Stopped,
    /// Encoding failed mid-stream
    Failed(String),
}

/// An [`EncoderEvent`] tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEncoderEvent {
    pub session: Uuid,
    pub event: EncoderEvent,
}

/// Sending half of the encoder event channel, bound to one session.
///
/// Usable from any thread.
#[derive(Debug, Clone)]
pub struct EncoderEvents {
    session: Uuid,
    tx: mpsc::UnboundedSender<TaggedEncoderEvent>,
}

impl EncoderEvents {
    pub fn new(session: Uuid, tx: mpsc::UnboundedSender<TaggedEncoderEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn emit(&self, event: EncoderEvent) {
        let tagged = TaggedEncoderEvent {
            session: self.session,
            event,
        };
        if self.tx.send(tagged).is_err() {
            tracing::debug!("Encoder event dropped, controller is gone");
        }
    }

    pub fn fragment(&self, data: Vec<u8>) {
        self.emit(EncoderEvent::Fragment(data));
    }

    pub fn stopped(&self) {
        self.emit(EncoderEvent::Stopped);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.emit(EncoderEvent::Failed(message.into()));
    }
}

/// Encoder activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// A started-once stream encoder.
///
/// `stop` is a request: completion is signalled by [`EncoderEvent::Stopped`].
pub trait StreamEncoder: Send {
    /// Begin encoding, flushing a fragment at least every `timeslice`
    fn start(&mut self, timeslice: Duration) -> Result<(), EncoderError>;

    /// Feed one composite frame. Dropped unless recording.
    fn write_frame(&mut self, frame: &VideoFrame);

    /// Feed `frame` for `periods` consecutive frame periods
    fn write_repeated(&mut self, frame: &VideoFrame, periods: u32) {
        for _ in 0..periods {
            self.write_frame(frame);
        }
    }

    fn pause(&mut self);

    fn resume(&mut self);

    /// Request the encoder to finish
    fn stop(&mut self);

    fn state(&self) -> EncoderState;

    /// Negotiated container/codec, if any
    fn mime_type(&self) -> Option<String>;
}

/// Builds encoders and reports which formats it can produce
pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        stream: OutputStream,
        options: EncoderOptions,
        events: EncoderEvents,
    ) -> Result<Box<dyn StreamEncoder>, EncoderError>;
}
