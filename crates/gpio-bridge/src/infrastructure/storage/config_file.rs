//! Persistence backends for the configuration record.
//!
//! The default backend keeps the record as TOML at
//! `$XDG_CONFIG_HOME/gpio-bridge/config.toml` (falling back to
//! `~/.config/gpio-bridge/config.toml`).  Saves go through a temporary file
//! and a rename, so a reader never sees half a file.
//!
//! ```toml
//! config_flag = 170
//!
//! [tcp]
//! address = "10.168.0.20"
//! port = 5000
//! enabled = true
//! user = "bridge"
//! password = "secret"
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use gpio_core::ConfigurationRecord;
use thiserror::Error;

/// File name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Error type for configuration persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine the config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The backend refused the operation.
    #[error("config storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for one [`ConfigurationRecord`].
pub trait ConfigPersistence: Send + Sync {
    /// Returns the stored record, or `None` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the stored record cannot be read.
    fn load(&self) -> Result<Option<ConfigurationRecord>, PersistenceError>;

    /// Replaces the stored record.  When this returns `Ok`, the record is
    /// durable.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the record could not be stored; the
    /// previous record is then still in place.
    fn save(&self, record: &ConfigurationRecord) -> Result<(), PersistenceError>;
}

// ── TOML file ─────────────────────────────────────────────────────────────────

/// TOML file backend.
#[derive(Debug, Clone)]
pub struct TomlFilePersistence {
    path: PathBuf,
}

impl TomlFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backend at the default location.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NoPlatformConfigDir`] when the config base
    /// directory cannot be determined from the environment.
    pub fn at_default_location() -> Result<Self, PersistenceError> {
        Ok(Self::new(default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPersistence for TomlFilePersistence {
    fn load(&self) -> Result<Option<ConfigurationRecord>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(toml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, record: &ConfigurationRecord) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(record)?;
        let staging = self.path.with_extension("toml.tmp");
        std::fs::write(&staging, content).map_err(|source| PersistenceError::Io {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Resolves `<config dir>/gpio-bridge/config.toml`.
///
/// # Errors
///
/// Returns [`PersistenceError::NoPlatformConfigDir`] if neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn default_config_path() -> Result<PathBuf, PersistenceError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(PersistenceError::NoPlatformConfigDir)?;
    Ok(base.join("gpio-bridge").join(CONFIG_FILE_NAME))
}

// ── In memory ─────────────────────────────────────────────────────────────────

/// Volatile backend, for `--ephemeral` runs and tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stored: Mutex<Option<ConfigurationRecord>>,
    refuse_saves: Mutex<bool>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `record` already stored.
    pub fn with_record(record: ConfigurationRecord) -> Self {
        Self {
            stored: Mutex::new(Some(record)),
            refuse_saves: Mutex::new(false),
        }
    }

    /// Makes every later `save` fail with [`PersistenceError::Unavailable`].
    pub fn refuse_saves(&self, refuse: bool) {
        *self.refuse_saves.lock().unwrap_or_else(PoisonError::into_inner) = refuse;
    }

    pub fn stored(&self) -> Option<ConfigurationRecord> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfigPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<ConfigurationRecord>, PersistenceError> {
        Ok(self.stored())
    }

    fn save(&self, record: &ConfigurationRecord) -> Result<(), PersistenceError> {
        if *self.refuse_saves.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(PersistenceError::Unavailable("saves refused".to_string()));
        }
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("gpio-bridge-test-{}", Uuid::new_v4()))
            .join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_load_missing_file_returns_none() {
        let store = TomlFilePersistence::new(temp_config_path());

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_config_path();
        let store = TomlFilePersistence::new(&path);
        let mut record = ConfigurationRecord::default();
        record.tcp.address = Ipv4Addr::new(10, 168, 0, 20);
        record.tcp.port = 5000;
        record.tcp.enabled = true;

        // Act
        store.save(&record).unwrap();
        let loaded = store.load().unwrap();

        // Assert
        assert_eq!(loaded, Some(record));
        assert!(!path.with_extension("toml.tmp").exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[tcp\nport = ").unwrap();
        let store = TomlFilePersistence::new(&path);

        let result = store.load();

        assert!(matches!(result, Err(PersistenceError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_memory_backend_can_refuse_saves() {
        // Arrange
        let store = MemoryPersistence::with_record(ConfigurationRecord::default());
        store.refuse_saves(true);
        let mut changed = ConfigurationRecord::default();
        changed.local_log.enabled = true;

        // Act
        let result = store.save(&changed);

        // Assert
        assert!(matches!(result, Err(PersistenceError::Unavailable(_))));
        assert_eq!(store.stored(), Some(ConfigurationRecord::default()));
    }
}
