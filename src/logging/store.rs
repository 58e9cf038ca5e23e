//! Key-value stores for the persisted debug trail
//!
//! `FileStore` writes one JSON document per key, atomically via
//! `tempfile::NamedTempFile` and under an `fd-lock` advisory lock.

use fd_lock::RwLock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum size of one stored value (1 MB)
pub const MAX_VALUE_SIZE: u64 = 1024 * 1024;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Lock acquisition failed
    #[error("lock error: {0}")]
    LockError(String),

    /// Key contains characters that cannot name a file
    #[error("invalid store key: {0}")]
    InvalidKey(String),

    /// Stored value exceeds the size limit
    #[error("stored value too large: {size} bytes (max: {max} bytes)")]
    ValueTooLarge {
        /// Actual size
        size: u64,
        /// Allowed size
        max: u64,
    },
}

/// String key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Read the value for `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value for `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`; missing keys are not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Directory-backed store, one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    fn lock_file(&self, path: &Path) -> Result<RwLock<std::fs::File>, StoreError> {
        let lock_path = path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::LockError(format!("Failed to create lock file: {e}")))?;
        Ok(RwLock::new(file))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.value_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let lock = self.lock_file(&path)?;
        let _guard = lock
            .read()
            .map_err(|e| StoreError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let size = std::fs::metadata(&path)
            .map_err(|e| StoreError::IoError(e.to_string()))?
            .len();
        if size > MAX_VALUE_SIZE {
            return Err(StoreError::ValueTooLarge {
                size,
                max: MAX_VALUE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(Some(contents))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        if value.len() as u64 > MAX_VALUE_SIZE {
            return Err(StoreError::ValueTooLarge {
                size: value.len() as u64,
                max: MAX_VALUE_SIZE,
            });
        }

        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::IoError(e.to_string()))?;

        let mut lock = self.lock_file(&path)?;
        let _guard = lock
            .write()
            .map_err(|e| StoreError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|e| StoreError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StoreError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .persist(&path)
            .map_err(|e| StoreError::IoError(format!("Failed to persist temp file: {e}")))?;

        debug!(path = %path.display(), bytes = value.len(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::IoError(e.to_string())),
        }
        if let Err(e) = std::fs::remove_file(path.with_extension("lock")) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "Failed to remove lock file");
            }
        }
        Ok(())
    }
}
