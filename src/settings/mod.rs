//! Recorder settings
//!
//! Overlay appearance and capture quality, persisted as a single JSON blob.

pub mod schema;
pub mod store;

pub use schema::{OverlayPosition, OverlayShape, OverlaySize, Quality, Settings};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, SettingsStore, StoreError, SETTINGS_KEY};
