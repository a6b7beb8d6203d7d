//! Runtime configuration
//!
//! `ControllerConfig` tunes the recording pipeline; `AppConfig` drives the
//! headless binary and is read from a JSON file.

use crate::capture::{Resolution, SCREEN_FRAME_RATE};
use crate::encoder::DEFAULT_VIDEO_BITRATE;
use crate::settings::SETTINGS_KEY;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline tuning for a [`crate::recorder::RecordingController`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Composite frames per second
    pub frame_rate: u32,
    /// Encoder fragment interval
    pub timeslice_ms: u64,
    pub video_bits_per_second: u32,
    /// Upper bound on waiting for both sources' first frames
    pub ready_timeout_ms: u64,
    /// Elapsed-time refresh interval while recording
    pub display_interval_ms: u64,
    pub command_buffer: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            frame_rate: SCREEN_FRAME_RATE,
            timeslice_ms: 1000,
            video_bits_per_second: DEFAULT_VIDEO_BITRATE,
            ready_timeout_ms: 10_000,
            display_interval_ms: 1000,
            command_buffer: 32,
        }
    }
}

impl ControllerConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frame_rate.max(1)))
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms.max(1))
    }
}

/// A pause inserted into a scripted headless recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseWindow {
    /// Seconds into the recording
    pub at_secs: u64,
    pub for_secs: u64,
}

/// Configuration of the headless recorder binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub settings_path: PathBuf,
    pub settings_key: String,
    /// Recording length, pauses excluded
    pub record_secs: u64,
    pub pause: Option<PauseWindow>,
    pub ffmpeg_path: PathBuf,
    /// Resolutions granted by the synthetic pickers; `None` grants what
    /// was requested
    pub screen_resolution: Option<Resolution>,
    pub camera_resolution: Option<Resolution>,
    pub controller: ControllerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            settings_path: PathBuf::from("recorder-settings.json"),
            settings_key: SETTINGS_KEY.to_string(),
            record_secs: 5,
            pause: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            screen_resolution: None,
            camera_resolution: None,
            controller: ControllerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&json)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.controller.frame_rate == 0 {
            return Err(AppError::Config("frameRate must be positive".into()));
        }
        if self.settings_key.is_empty() {
            return Err(AppError::Config("settingsKey must not be empty".into()));
        }
        Ok(())
    }
}
