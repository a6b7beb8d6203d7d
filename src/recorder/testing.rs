//! In-process encoder double for controller tests

use crate::capture::VideoFrame;
use crate::encoder::{
    EncoderError, EncoderEvents, EncoderFactory, EncoderOptions, EncoderState, OutputStream,
    StreamEncoder, CODEC_PREFERENCES,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Frames per emitted fragment
const FRAMES_PER_FRAGMENT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    Normal,
    /// Every fragment is zero-length
    EmptyFragments,
    /// `start()` fails
    FailOnStart,
}

#[derive(Default)]
struct FakeState {
    created: AtomicUsize,
    frames: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
    events: Mutex<Option<EncoderEvents>>,
    last_stream: Mutex<Option<OutputStream>>,
    last_options: Mutex<Option<EncoderOptions>>,
    last_frame: Mutex<Option<VideoFrame>>,
}

/// Encoder factory recording every interaction
#[derive(Clone)]
pub struct FakeEncoderFactory {
    mode: FakeMode,
    state: Arc<FakeState>,
}

impl FakeEncoderFactory {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn frames_written(&self) -> usize {
        self.state.frames.load(Ordering::SeqCst)
    }

    /// Lifecycle calls made on the last encoder
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().clone()
    }

    pub fn last_stream(&self) -> Option<OutputStream> {
        self.state.last_stream.lock().clone()
    }

    pub fn last_options(&self) -> Option<EncoderOptions> {
        self.state.last_options.lock().clone()
    }

    /// Last frame written while recording
    pub fn last_frame(&self) -> Option<VideoFrame> {
        self.state.last_frame.lock().clone()
    }

    /// Report a mid-stream failure from the last encoder
    pub fn fail(&self, message: &str) {
        if let Some(events) = self.state.events.lock().as_ref() {
            events.failed(message);
        }
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        CODEC_PREFERENCES.contains(&mime_type)
    }

    fn create(
        &self,
        stream: OutputStream,
        options: EncoderOptions,
        events: EncoderEvents,
    ) -> Result<Box<dyn StreamEncoder>, EncoderError> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        self.state.calls.lock().clear();
        *self.state.last_stream.lock() = Some(stream);
        *self.state.last_options.lock() = Some(options.clone());
        *self.state.events.lock() = Some(events.clone());

        Ok(Box::new(FakeEncoder {
            mode: self.mode,
            options,
            events,
            state: self.state.clone(),
            encoder_state: EncoderState::Inactive,
            pending: Vec::new(),
            frames_in_fragment: 0,
        }))
    }
}

struct FakeEncoder {
    mode: FakeMode,
    options: EncoderOptions,
    events: EncoderEvents,
    state: Arc<FakeState>,
    encoder_state: EncoderState,
    pending: Vec<u8>,
    frames_in_fragment: usize,
}

impl FakeEncoder {
    fn flush(&mut self) {
        let data = std::mem::take(&mut self.pending);
        self.frames_in_fragment = 0;
        match self.mode {
            FakeMode::EmptyFragments => self.events.fragment(Vec::new()),
            _ => self.events.fragment(data),
        }
    }
}

impl StreamEncoder for FakeEncoder {
    fn start(&mut self, _timeslice: Duration) -> Result<(), EncoderError> {
        self.state.calls.lock().push("start");
        if self.mode == FakeMode::FailOnStart {
            return Err(EncoderError::Unsupported("fake encoder refused to start".into()));
        }
        self.encoder_state = EncoderState::Recording;
        Ok(())
    }

    fn write_frame(&mut self, frame: &VideoFrame) {
        if self.encoder_state != EncoderState::Recording {
            return;
        }
        self.state.frames.fetch_add(1, Ordering::SeqCst);
        *self.state.last_frame.lock() = Some(frame.clone());
        self.pending.extend_from_slice(&frame.data()[..4.min(frame.data().len())]);
        self.frames_in_fragment += 1;
        if self.frames_in_fragment >= FRAMES_PER_FRAGMENT {
            self.flush();
        }
    }

    fn pause(&mut self) {
        self.state.calls.lock().push("pause");
        self.encoder_state = EncoderState::Paused;
    }

    fn resume(&mut self) {
        self.state.calls.lock().push("resume");
        self.encoder_state = EncoderState::Recording;
    }

    fn stop(&mut self) {
        if self.encoder_state == EncoderState::Inactive {
            return;
        }
        self.state.calls.lock().push("stop");
        self.encoder_state = EncoderState::Inactive;
        self.flush();
        self.events.stopped();
    }

    fn state(&self) -> EncoderState {
        self.encoder_state
    }

    fn mime_type(&self) -> Option<String> {
        self.options.mime_type.clone()
    }
}
