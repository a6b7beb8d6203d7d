//! Settings schema definitions
//!
//! Field and variant names match the blob the recorder page has always
//! persisted (`overlayPosition: "bottom-left"`, `quality: "1080p"`, ...).

use crate::capture::Resolution;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// Overlay Types
// =============================================================================

/// Corner of the canvas the camera overlay is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    #[default]
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

/// Overlay edge length relative to the canvas height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlaySize {
    Small,
    #[default]
    Medium,
    Large,
}

impl OverlaySize {
    /// Fraction of the canvas height used for the overlay square
    pub fn ratio(&self) -> f64 {
        match self {
            OverlaySize::Small => 0.20,
            OverlaySize::Medium => 0.25,
            OverlaySize::Large => 0.30,
        }
    }
}

/// Clip shape of the camera overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayShape {
    #[default]
    Circle,
    Rectangle,
    Rounded,
}

// =============================================================================
// Capture Types
// =============================================================================

/// Requested screen capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "720p")]
    Hd,
    #[default]
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "1440p")]
    Qhd,
}

impl Quality {
    /// Resolution requested from the display picker
    pub fn resolution(&self) -> Resolution {
        match self {
            Quality::Hd => Resolution::new(1280, 720),
            Quality::FullHd => Resolution::new(1920, 1080),
            Quality::Qhd => Resolution::new(2560, 1440),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// User-configurable recorder settings.
///
/// Replaced wholesale on every change; never partially invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub overlay_position: OverlayPosition,
    pub overlay_size: OverlaySize,
    pub overlay_shape: OverlayShape,
    pub quality: Quality,
    pub include_microphone: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay_position: OverlayPosition::default(),
            overlay_size: OverlaySize::default(),
            overlay_shape: OverlayShape::default(),
            quality: Quality::default(),
            include_microphone: true,
        }
    }
}

impl Settings {
    /// Merge a persisted blob over the defaults.
    ///
    /// A field is taken only when its key is present and its value is valid
    /// for the field type. Anything else keeps the default.
    pub fn merge_json(blob: &str) -> Self {
        let mut settings = Self::default();

        let value: serde_json::Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Could not parse persisted settings: {}", e);
                return settings;
            }
        };

        let Some(fields) = value.as_object() else {
            tracing::warn!("Persisted settings are not an object, using defaults");
            return settings;
        };

        merge_field(fields, "overlayPosition", &mut settings.overlay_position);
        merge_field(fields, "overlaySize", &mut settings.overlay_size);
        merge_field(fields, "overlayShape", &mut settings.overlay_shape);
        merge_field(fields, "quality", &mut settings.quality);
        merge_field(fields, "includeMicrophone", &mut settings.include_microphone);

        settings
    }
}

fn merge_field<T: DeserializeOwned>(
    fields: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = fields.get(key) else {
        return;
    };

    match T::deserialize(raw) {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring invalid persisted value for {}: {}", key, raw),
    }
}
