//! Recording state management
//!
//! Defines the session phases, elapsed-time bookkeeping across pauses and
//! the status published to the UI.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No session in progress
    #[default]
    Idle,
    /// Acquiring sources and building the pipeline
    Initializing,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
    /// Stop requested, waiting for the encoder to finish
    Processing,
    /// Output delivered
    Complete,
    /// Session failed
    Error,
}

impl Phase {
    /// Status text shown for this phase
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Ready",
            Phase::Initializing => "Initializing...",
            Phase::Recording => "Recording",
            Phase::Paused => "Paused",
            Phase::Processing => "Processing...",
            Phase::Complete => "Recording Complete",
            Phase::Error => "Recording Error",
        }
    }

    /// Whether encoded fragments are accepted in this phase
    pub fn accepts_fragments(&self) -> bool {
        matches!(self, Phase::Recording | Phase::Paused | Phase::Processing)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Elapsed recording time, excluding paused intervals.
///
/// All timestamps are milliseconds on one monotonic timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedClock {
    started_ms: Option<u64>,
    paused_at_ms: Option<u64>,
    paused_total_ms: u64,
    frozen_ms: Option<u64>,
}

impl ElapsedClock {
    /// Start a fresh clock at `now`
    pub fn start(&mut self, now_ms: u64) {
        *self = Self {
            started_ms: Some(now_ms),
            ..Self::default()
        };
    }

    pub fn pause(&mut self, now_ms: u64) {
        if self.started_ms.is_some() && self.paused_at_ms.is_none() {
            self.paused_at_ms = Some(now_ms);
        }
    }

    pub fn resume(&mut self, now_ms: u64) {
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.paused_total_ms += now_ms.saturating_sub(paused_at);
        }
    }

    /// Fix the elapsed value at `now`; later reads return it unchanged
    pub fn freeze(&mut self, now_ms: u64) {
        if self.frozen_ms.is_none() {
            self.frozen_ms = Some(self.elapsed_ms(now_ms));
        }
    }

    /// Start of the current unpaused interval, shifted by time spent paused
    pub fn baseline_ms(&self) -> Option<u64> {
        self.started_ms.map(|start| start + self.paused_total_ms)
    }

    pub fn paused_total_ms(&self) -> u64 {
        self.paused_total_ms
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_ms.is_some()
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        if let Some(frozen) = self.frozen_ms {
            return frozen;
        }
        let Some(baseline) = self.baseline_ms() else {
            return 0;
        };
        let until = self.paused_at_ms.unwrap_or(now_ms);
        until.saturating_sub(baseline)
    }
}

/// Format milliseconds as `MM:SS`
pub fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Status notification published on every phase change and once per
/// second while recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub phase: Phase,
    /// `MM:SS`, `00:00` outside of Recording/Paused
    pub elapsed: String,
    /// Error description or delivery details
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn new(phase: Phase, elapsed_ms: u64, message: Option<String>) -> Self {
        let elapsed = if matches!(phase, Phase::Recording | Phase::Paused) {
            format_elapsed(elapsed_ms)
        } else {
            format_elapsed(0)
        };
        Self {
            phase,
            elapsed,
            message,
        }
    }

    /// Text for a status line, e.g. `Recording Error: No data captured`
    pub fn text(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.phase.label(), message),
            None => self.phase.label().to_string(),
        }
    }
}

impl Default for StatusUpdate {
    fn default() -> Self {
        Self::new(Phase::Idle, 0, None)
    }
}
