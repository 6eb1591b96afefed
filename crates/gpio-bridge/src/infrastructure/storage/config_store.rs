//! The configuration store: sole writer of the live configuration record.
//!
//! Readers hold a `watch::Receiver<Arc<ConfigurationRecord>>` and always see
//! a whole record.  [`ConfigStore::apply_configuration`] validates, persists,
//! and only then publishes; on any failure the live record is untouched.
//! Publishing wakes every subscriber, which is how the session supervisor
//! learns it may need to restart.

use std::sync::{Arc, Mutex, PoisonError};

use gpio_core::{ConfigValidationError, ConfigurationRecord};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use super::config_file::{ConfigPersistence, PersistenceError};

/// Why a record was not applied.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration rejected: {0}")]
    Invalid(#[from] ConfigValidationError),

    #[error("configuration not persisted: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Owns the live configuration record.
pub struct ConfigStore {
    tx: watch::Sender<Arc<ConfigurationRecord>>,
    apply_lock: Mutex<()>,
    persistence: Arc<dyn ConfigPersistence>,
}

impl ConfigStore {
    /// Loads the stored record.
    ///
    /// A missing, unreadable, or invalid record (including a wrong validity
    /// marker) is replaced by [`ConfigurationRecord::default`], which is
    /// written back.
    pub fn load(persistence: Arc<dyn ConfigPersistence>) -> Self {
        let stored = match persistence.load() {
            Ok(Some(record)) => match record.validate() {
                Ok(()) => Some(record),
                Err(e) => {
                    warn!("stored configuration is invalid ({e}); using defaults");
                    None
                }
            },
            Ok(None) => {
                info!("no stored configuration; using defaults");
                None
            }
            Err(e) => {
                warn!("stored configuration unreadable ({e}); using defaults");
                None
            }
        };

        let record = match stored {
            Some(record) => record,
            None => {
                let defaults = ConfigurationRecord::default();
                if let Err(e) = persistence.save(&defaults) {
                    warn!("default configuration not written back: {e}");
                }
                defaults
            }
        };

        let (tx, _) = watch::channel(Arc::new(record));
        Self {
            tx,
            apply_lock: Mutex::new(()),
            persistence,
        }
    }

    /// The current record.
    pub fn snapshot(&self) -> Arc<ConfigurationRecord> {
        Arc::clone(&self.tx.borrow())
    }

    /// A receiver that is woken on every successful apply.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigurationRecord>> {
        self.tx.subscribe()
    }

    /// Validates, persists, and publishes `record` as one step.
    ///
    /// When this returns `Ok`, every reader already sees `record`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Invalid`] if `record` fails validation.
    /// - [`StoreError::Persistence`] if it could not be stored.
    ///
    /// In both cases the live record is unchanged.
    pub fn apply_configuration(&self, record: ConfigurationRecord) -> Result<(), StoreError> {
        record.validate()?;

        let _serial = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.persistence.save(&record)?;

        let mode = record.session_mode();
        self.tx.send_replace(Arc::new(record));
        match mode {
            Some(mode) => info!("configuration applied; session {} -> {}", mode.kind(), mode.target()),
            None => info!("configuration applied; no session transport enabled"),
        }
        Ok(())
    }

    /// Re-reads the stored record and applies it.  Does nothing if nothing
    /// is stored.
    ///
    /// # Errors
    ///
    /// As [`ConfigStore::apply_configuration`], plus
    /// [`StoreError::Persistence`] if the stored record cannot be read.
    pub fn reload(&self) -> Result<(), StoreError> {
        match self.persistence.load()? {
            Some(record) => self.apply_configuration(record),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::config_file::MemoryPersistence;
    use std::net::Ipv4Addr;

    fn tcp_enabled() -> ConfigurationRecord {
        let mut record = ConfigurationRecord::default();
        record.tcp.address = Ipv4Addr::new(10, 168, 0, 20);
        record.tcp.port = 5000;
        record.tcp.enabled = true;
        record
    }

    #[test]
    fn test_load_empty_backend_uses_and_stores_defaults() {
        // Arrange
        let backend = Arc::new(MemoryPersistence::new());

        // Act
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);

        // Assert
        assert_eq!(*store.snapshot(), ConfigurationRecord::default());
        assert_eq!(backend.stored(), Some(ConfigurationRecord::default()));
    }

    #[test]
    fn test_load_keeps_valid_stored_record() {
        let backend = Arc::new(MemoryPersistence::with_record(tcp_enabled()));

        let store = ConfigStore::load(backend);

        assert_eq!(*store.snapshot(), tcp_enabled());
    }

    #[test]
    fn test_load_with_bad_marker_falls_back_to_defaults() {
        // Arrange
        let mut stale = tcp_enabled();
        stale.config_flag = 0x00;
        let backend = Arc::new(MemoryPersistence::with_record(stale));

        // Act
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);

        // Assert
        assert_eq!(*store.snapshot(), ConfigurationRecord::default());
        assert_eq!(backend.stored(), Some(ConfigurationRecord::default()));
    }

    #[tokio::test]
    async fn test_apply_publishes_to_subscribers() {
        // Arrange
        let backend = Arc::new(MemoryPersistence::new());
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);
        let mut rx = store.subscribe();

        // Act
        store.apply_configuration(tcp_enabled()).unwrap();

        // Assert
        tokio_test::assert_ok!(rx.changed().await);
        assert_eq!(**rx.borrow(), tcp_enabled());
        assert_eq!(*store.snapshot(), tcp_enabled());
        assert_eq!(backend.stored(), Some(tcp_enabled()));
    }

    #[test]
    fn test_apply_invalid_record_changes_nothing() {
        // Arrange
        let backend = Arc::new(MemoryPersistence::new());
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);
        let rx = store.subscribe();
        let mut invalid = tcp_enabled();
        invalid.tcp.port = 0;

        // Act
        let result = store.apply_configuration(invalid);

        // Assert
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert_eq!(*store.snapshot(), ConfigurationRecord::default());
        assert_eq!(backend.stored(), Some(ConfigurationRecord::default()));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_apply_with_failing_persistence_changes_nothing() {
        // Arrange
        let backend = Arc::new(MemoryPersistence::new());
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);
        let rx = store.subscribe();
        backend.refuse_saves(true);

        // Act
        let result = store.apply_configuration(tcp_enabled());

        // Assert
        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert_eq!(*store.snapshot(), ConfigurationRecord::default());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reload_applies_externally_edited_record() {
        // Arrange
        let backend = Arc::new(MemoryPersistence::new());
        let store = ConfigStore::load(Arc::clone(&backend) as Arc<dyn ConfigPersistence>);
        backend.save(&tcp_enabled()).unwrap();

        // Act
        store.reload().unwrap();

        // Assert
        assert_eq!(*store.snapshot(), tcp_enabled());
    }
}
