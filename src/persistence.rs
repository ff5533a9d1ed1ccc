//! Key-value persistence for digests and the webhook secret.
//!
//! The store only needs "get a string by key" and "replace the string at a
//! key". Anything that offers that can back it:
//! - [`FileKeyValueStore`]: one file per key inside a data directory
//! - [`MemoryKeyValueStore`]: process-local map, used for tests and dry runs
//!
//! Writes replace the whole value. There is no locking across processes, so
//! two writers sharing one directory overwrite each other's snapshots.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, instrument};

/// Key holding the JSON array of digest configurations.
pub const DIGESTS_KEY: &str = "newsDigests";
/// Key holding the plain-text webhook secret.
pub const WEBHOOK_SECRET_KEY: &str = "newsDigestWebhookSecret";

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize value for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal string key-value storage.
pub trait KeyValueStore {
    /// Read the value stored at `key`, `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the value stored at `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }
}

fn check_key(key: &str) -> Result<(), PersistenceError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey(key.to_string()))
    }
}

/// Stores each key as a file named after the key inside `dir`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileKeyValueStore {
    #[instrument(level = "debug", skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored value");
                Ok(None)
            }
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    #[instrument(level = "debug", skip(self, value), fields(bytes = value.len()))]
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let io_err = |source| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        debug!(path = %path.display(), "Stored value");
        Ok(())
    }
}

/// In-memory storage. Pass `&MemoryKeyValueStore` to share one map between
/// several stores.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key, as if a previous session had written it.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        check_key(key)?;
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        check_key(key)?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
