//! Session state machine
//!
//! Pure transition function from (phase, event) to (phase, effects). The
//! controller feeds it collaborator events and executes the effects it
//! returns; nothing here touches media, timers or the UI.

use super::error::{RecorderError, SessionFailure};
use super::state::{ElapsedClock, Phase};
use crate::capture::{CaptureError, SourceKind};
use crate::delivery::Recording;
use chrono::{DateTime, Utc};

/// Point in time an event is handled at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Now {
    /// Monotonic milliseconds, used for elapsed bookkeeping
    pub ms: u64,
    /// Wall clock, used for output naming
    pub wall: DateTime<Utc>,
}

impl Now {
    pub fn new(ms: u64, wall: DateTime<Utc>) -> Self {
        Self { ms, wall }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Begin,
    AcquisitionFailed(CaptureError),
    SourceReady(SourceKind),
    PipelineStarted,
    PipelineFailed(String),
    Pause,
    Resume,
    Stop,
    Fragment(Vec<u8>),
    EncoderStopped,
    EncoderFailed(String),
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone)]
pub enum Effect {
    /// Publish a status change
    Notify {
        phase: Phase,
        message: Option<String>,
    },
    /// Acquire both sources and wait for their first frames
    AcquireSources,
    /// Build the surface, start the frame loop, start the encoder
    StartPipeline,
    PauseEncoder,
    ResumeEncoder,
    /// Stop feeding frames to the encoder
    HaltFrameLoop,
    /// Request the encoder to finish
    StopEncoder,
    /// Release every session resource
    Cleanup,
    /// The session failed
    Failed(SessionFailure),
    /// Hand the finished recording to the output sink
    Deliver(Recording),
}

/// Two independent readiness signals, joined with a logical AND
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadyBarrier {
    screen: bool,
    camera: bool,
}

impl ReadyBarrier {
    pub fn mark(&mut self, kind: SourceKind) {
        match kind {
            SourceKind::Screen => self.screen = true,
            SourceKind::Camera => self.camera = true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.screen && self.camera
    }
}

/// State of the one active recording session
#[derive(Debug, Default)]
pub struct SessionMachine {
    phase: Phase,
    clock: ElapsedClock,
    ready: ReadyBarrier,
    pipeline_requested: bool,
    fragments: Vec<Vec<u8>>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn clock(&self) -> &ElapsedClock {
        &self.clock
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Elapsed recording time as displayed to the user
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.clock.elapsed_ms(now_ms)
    }

    /// Apply one event. Commands that are invalid in the current phase are
    /// rejected; late collaborator events are ignored.
    pub fn handle(&mut self, event: SessionEvent, now: Now) -> Result<Vec<Effect>, RecorderError> {
        use SessionEvent as E;

        match (self.phase, event) {
            (Phase::Idle, E::Begin) => {
                self.clock = ElapsedClock::default();
                self.ready = ReadyBarrier::default();
                self.pipeline_requested = false;
                self.fragments.clear();
                Ok(vec![self.enter(Phase::Initializing, None), Effect::AcquireSources])
            }
            (phase, E::Begin) => Err(RecorderError::SessionActive(phase)),

            (Phase::Initializing, E::AcquisitionFailed(err)) => {
                Ok(self.fail(SessionFailure::Capture(err)))
            }
            (Phase::Initializing, E::SourceReady(kind)) => {
                self.ready.mark(kind);
                if self.ready.is_open() && !self.pipeline_requested {
                    self.pipeline_requested = true;
                    Ok(vec![Effect::StartPipeline])
                } else {
                    Ok(Vec::new())
                }
            }
            (Phase::Initializing, E::PipelineStarted) => {
                self.clock.start(now.ms);
                Ok(vec![self.enter(Phase::Recording, None)])
            }
            (Phase::Initializing, E::PipelineFailed(message)) => {
                Ok(self.fail(SessionFailure::Pipeline(message)))
            }

            (Phase::Recording, E::Pause) => {
                self.clock.pause(now.ms);
                Ok(vec![Effect::PauseEncoder, self.enter(Phase::Paused, None)])
            }
            (Phase::Paused, E::Resume) => {
                self.clock.resume(now.ms);
                Ok(vec![Effect::ResumeEncoder, self.enter(Phase::Recording, None)])
            }
            (Phase::Recording | Phase::Paused, E::Stop) => {
                self.clock.resume(now.ms);
                self.clock.freeze(now.ms);
                Ok(vec![
                    Effect::HaltFrameLoop,
                    Effect::StopEncoder,
                    self.enter(Phase::Processing, None),
                ])
            }
            (phase, E::Pause) => Err(invalid(phase, "pause")),
            (phase, E::Resume) => Err(invalid(phase, "resume")),
            (phase, E::Stop) => Err(invalid(phase, "stop")),

            (phase, E::Fragment(data)) if phase.accepts_fragments() => {
                if data.is_empty() {
                    tracing::trace!("Discarding zero-length fragment");
                } else {
                    self.fragments.push(data);
                }
                Ok(Vec::new())
            }

            (Phase::Processing, E::EncoderStopped) => Ok(self.finish(now)),
            (Phase::Recording | Phase::Paused, E::EncoderStopped) => {
                // Encoder ended on its own, e.g. a source track ended
                tracing::warn!("Encoder stopped without a stop request");
                self.clock.resume(now.ms);
                self.clock.freeze(now.ms);
                let mut effects = vec![Effect::HaltFrameLoop, self.enter(Phase::Processing, None)];
                effects.extend(self.finish(now));
                Ok(effects)
            }

            (Phase::Initializing | Phase::Recording | Phase::Paused | Phase::Processing, E::EncoderFailed(message)) => {
                Ok(self.fail(SessionFailure::Encoder(message)))
            }

            (phase, event) => {
                tracing::debug!("Ignoring {:?} while {:?}", event, phase);
                Ok(Vec::new())
            }
        }
    }

    fn enter(&mut self, phase: Phase, message: Option<String>) -> Effect {
        tracing::debug!("Session phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        Effect::Notify { phase, message }
    }

    /// Terminal failure: cleanup, surface the error, return to Idle
    fn fail(&mut self, failure: SessionFailure) -> Vec<Effect> {
        tracing::error!("Recording session failed: {}", failure);
        self.fragments.clear();
        let notify = self.enter(Phase::Error, Some(failure.to_string()));
        let mut effects = vec![Effect::Cleanup, Effect::Failed(failure), notify];
        effects.push(self.reset());
        effects
    }

    /// Encoder has ceased: assemble the output or fail
    fn finish(&mut self, now: Now) -> Vec<Effect> {
        if self.fragments.is_empty() {
            return self.fail(SessionFailure::NoDataCaptured);
        }

        let fragments = std::mem::take(&mut self.fragments);
        let recording = Recording::assemble(&fragments, self.clock.elapsed_ms(now.ms), now.wall);
        if recording.is_empty() {
            return self.fail(SessionFailure::EmptyOutput);
        }

        tracing::info!(
            "Recording assembled: {} bytes from {} fragment(s)",
            recording.len(),
            recording.fragment_count
        );
        let filename = recording.suggested_filename.clone();
        let notify = self.enter(Phase::Complete, Some(filename));
        vec![Effect::Cleanup, Effect::Deliver(recording), notify, self.reset()]
    }

    fn reset(&mut self) -> Effect {
        self.clock = ElapsedClock::default();
        self.ready = ReadyBarrier::default();
        self.pipeline_requested = false;
        self.enter(Phase::Idle, None)
    }
}

fn invalid(phase: Phase, action: &'static str) -> RecorderError {
    RecorderError::InvalidTransition { phase, action }
}
