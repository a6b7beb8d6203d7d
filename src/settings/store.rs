//! Settings persistence
//!
//! The recorder keeps one settings blob in a key-value medium. Storage
//! failures are logged and never reach the recording lifecycle.

use super::schema::Settings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Key the settings blob is stored under
pub const SETTINGS_KEY: &str = "recorderSettings";

/// Persistence-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value persistence medium
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// In-process store scoped to the lifetime of the recorder
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();

        // A corrupt file is replaced rather than blocking every later save
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }
}

/// Loads and saves [`Settings`] through a [`KeyValueStore`]
pub struct SettingsStore {
    backend: Box<dyn KeyValueStore>,
    key: String,
}

impl SettingsStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self::with_key(backend, SETTINGS_KEY)
    }

    pub fn with_key(backend: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Load settings, falling back to defaults on absence or any failure
    pub fn load(&self) -> Settings {
        match self.backend.get(&self.key) {
            Ok(Some(blob)) => Settings::merge_json(&blob),
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!("Could not load settings: {}", e);
                Settings::default()
            }
        }
    }

    /// Persist settings. Failures are logged only.
    pub fn save(&self, settings: &Settings) {
        let result = serde_json::to_string(settings)
            .map_err(StoreError::from)
            .and_then(|blob| self.backend.set(&self.key, &blob));

        if let Err(e) = result {
            tracing::warn!("Could not save settings: {}", e);
        }
    }
}
