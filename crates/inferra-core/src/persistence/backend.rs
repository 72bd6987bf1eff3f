//! Key-value storage backends.
//!
//! The session store only needs three operations against its storage: read a
//! text value, write a text value, remove a key. Anything that can do those
//! can back a [`SessionStore`](super::store::SessionStore).
//!
//! - [`MemoryBackend`] lives as long as the owning process, the same way
//!   browser session storage lives as long as its tab.
//! - [`FileBackend`] keeps one `<key>.json` file per key in a directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Error type for backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the value would exceed the backend's size limit.
    #[error("Quota exceeded: {size} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { size: usize, limit: usize },

    /// The key can't be used by this backend.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Internal state is unusable (poisoned lock).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Scoped text key-value storage.
pub trait PersistenceBackend: Send + Sync {
    /// Read the value stored under `key`, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), BackendError>;
}

// ============================================================================
// Memory Backend
// ============================================================================

/// In-process storage with an optional total size limit.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that rejects writes once the stored keys and values
    /// would exceed `quota` bytes in total.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Overwrite a raw value without any checks. Useful for seeding corrupt
    /// payloads in tests.
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }
}

impl PersistenceBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let size = others + key.len() + value.len();
            if size > limit {
                return Err(BackendError::QuotaExceeded { size, limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// File Backend
// ============================================================================

/// Directory-backed storage, one `<key>.json` file per key.
///
/// Writes go to `<key>.json.tmp` first and are then renamed into place, so a
/// crash mid-write never leaves a truncated value behind.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BackendError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl PersistenceBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        let temp_path = self.dir.join(format!("{key}.json.tmp"));

        fs::create_dir_all(&self.dir)?;
        let written = fs::write(&temp_path, value).and_then(|_| fs::rename(&temp_path, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                log::debug!("Failed to remove {}: {}", temp_path.display(), cleanup);
            }
            return Err(e.into());
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Keys become file names, so they must be exactly one normal path component.
fn validate_key(key: &str) -> Result<(), BackendError> {
    if key.is_empty() {
        return Err(BackendError::InvalidKey("key cannot be empty".to_string()));
    }

    let mut components = Path::new(key).components();
    match components.next() {
        Some(Component::Normal(_)) if components.next().is_none() => Ok(()),
        _ => Err(BackendError::InvalidKey(key.to_string())),
    }
}

// ============================================================================
// TESTS
// ============================================================================
