//! Persistence of the light configuration.

use crate::light_control::config::{ConfigError, LightConfig};
use log::{info, warn};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Format(serde_json::Error),
    Invalid(ConfigError),
    /// Nothing has been saved yet
    Empty,
}

impl Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Configuration I/O failed: {}", e),
            StoreError::Format(e) => write!(f, "Invalid configuration format: {}", e),
            StoreError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
            StoreError::Empty => write!(f, "No configuration stored"),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Format(e)
    }
}

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<LightConfig, StoreError>;
    /// Either the whole record is stored or the old one is left in place.
    fn save(&self, config: &LightConfig) -> Result<(), StoreError>;
}

fn parse(json: &str) -> Result<LightConfig, StoreError> {
    let config: LightConfig = serde_json::from_str(json)?;
    config.validate().map_err(StoreError::Invalid)?;
    Ok(config)
}

/// Configuration kept as a JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> JsonFileStore {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<LightConfig, StoreError> {
        let json = fs::read_to_string(&self.path)?;
        parse(&json)
    }

    fn save(&self, config: &LightConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.temp_path();
        if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        info!("Saved light configuration to {}", self.path.display());
        Ok(())
    }
}

/// Store that keeps the serialized record in memory.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_record(json: &str) -> MemoryStore {
        MemoryStore {
            record: Mutex::new(Some(json.to_string())),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<LightConfig, StoreError> {
        let record = self
            .record
            .lock()
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        match record.as_deref() {
            Some(json) => parse(json),
            None => Err(StoreError::Empty),
        }
    }

    fn save(&self, config: &LightConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string(config)?;
        let mut record = self
            .record
            .lock()
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        *record = Some(json);
        Ok(())
    }
}

/// Load the stored configuration, falling back to the defaults.
pub fn load_or_default(store: &dyn ConfigStore) -> LightConfig {
    match store.load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load light configuration, using defaults: {}", e);
            LightConfig::default()
        }
    }
}
