//! Overlay Recorder - screen recordings with a webcam overlay.
//!
//! This is the main library crate. It composites a screen source and a
//! camera overlay into one surface, encodes it, and drives the recording
//! session lifecycle behind a [`recorder::RecorderHandle`].

pub mod capture;
pub mod compositor;
pub mod config;
pub mod delivery;
pub mod encoder;
pub mod overlay;
pub mod recorder;
pub mod settings;
pub mod utils;

use capture::SyntheticPicker;
use compositor::RasterSurfaceFactory;
use config::AppConfig;
use delivery::DirectorySink;
use encoder::FfmpegEncoderFactory;
use recorder::{Collaborators, Phase, RecorderHandle, RecordingController, StatusUpdate};
use settings::{JsonFileStore, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::error::AppResult;

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overlay_recorder=debug,overlay_recorder_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Build a controller over synthetic sources, ffmpeg and a directory sink
pub fn headless_recorder(config: &AppConfig) -> RecorderHandle {
    let mut picker = SyntheticPicker::new();
    if let Some(resolution) = config.screen_resolution {
        picker = picker.with_screen_resolution(resolution);
    }
    if let Some(resolution) = config.camera_resolution {
        picker = picker.with_camera_resolution(resolution);
    }

    let store = JsonFileStore::new(&config.settings_path);
    let collaborators = Collaborators {
        picker: Arc::new(picker),
        encoders: Arc::new(FfmpegEncoderFactory::new(&config.ffmpeg_path)),
        surfaces: Arc::new(RasterSurfaceFactory),
        settings: SettingsStore::with_key(Box::new(store), config.settings_key.clone()),
        sink: Arc::new(DirectorySink::new(&config.output_dir)),
    };

    RecordingController::spawn(collaborators, config.controller.clone())
}

/// Record one session as scripted by `config` and wait for its outcome.
///
/// Returns the terminal status: Complete with the file name, or Error.
pub async fn run(config: AppConfig) -> AppResult<StatusUpdate> {
    tracing::info!("Starting Overlay Recorder v{}", env!("CARGO_PKG_VERSION"));

    let recorder = headless_recorder(&config);
    let mut status = recorder.subscribe();
    tracing::info!("Settings: {:?}", recorder.settings());

    recorder.begin().await?;

    let total = Duration::from_secs(config.record_secs);
    match config.pause {
        Some(pause) if Duration::from_secs(pause.at_secs) < total => {
            let before = Duration::from_secs(pause.at_secs);
            tokio::time::sleep(before).await;
            recorder.pause().await?;
            tokio::time::sleep(Duration::from_secs(pause.for_secs)).await;
            recorder.resume().await?;
            tokio::time::sleep(total - before).await;
        }
        _ => tokio::time::sleep(total).await,
    }

    recorder.stop().await?;

    let mut outcome = recorder.status();
    loop {
        match status.recv().await {
            Ok(update) if matches!(update.phase, Phase::Complete | Phase::Error) => {
                outcome = update;
            }
            Ok(update) if update.phase == Phase::Idle => break,
            Ok(update) => tracing::debug!("{} {}", update.text(), update.elapsed),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Missed {} status updates", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    tracing::info!("{}", outcome.text());
    Ok(outcome)
}
