//! Key/value persistence for finds, categories and the parked car.
//!
//! `StorageBackend` is a string-keyed store; `FileStorage` keeps the whole map
//! in memory and rewrites a single JSON file on every mutation. Structured
//! values go through `save_json_backend`/`load_json_backend`.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const MARKERS_KEY: &str = "svampkartan-markers";
pub const CATEGORIES_KEY: &str = "svampkartan-categories";
pub const CAR_LOCATION_KEY: &str = "svampkartan-car-location";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Platform storage error: {0}")]
    Platform(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store.
pub trait StorageBackend: Send + Sync {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Returns Ok(None) when the key is missing.
    fn get_string(&self, key: &str) -> StorageResult<Option<String>>;

    /// No-op if the key does not exist.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

pub fn save_json_backend<T: Serialize>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    match serde_json::to_string(value) {
        Ok(s) => backend.set_string(key, &s),
        Err(e) => Err(StorageError::Json(e.to_string())),
    }
}

pub fn load_json_backend<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get_string(key)? {
        Some(s) => match serde_json::from_str::<T>(&s) {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(StorageError::Json(format!("{}: {}", key, e))),
        },
        None => Ok(None),
    }
}

/// File-based storage: one JSON object mapping keys to string values.
pub struct FileStorage {
    path: PathBuf,
    inner: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Per-user default location:
    /// - On Windows: %APPDATA%/Svampkartan/storage.json
    /// - Else: $HOME/.config/svampkartan/storage.json
    pub fn default_storage_path() -> PathBuf {
        if cfg!(windows)
            && let Ok(appdata) = std::env::var("APPDATA")
        {
            return Path::new(&appdata).join("Svampkartan").join("storage.json");
        }

        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home)
                .join(".config")
                .join("svampkartan")
                .join("storage.json");
        }

        Path::new(".").join("svampkartan-storage.json")
    }

    /// Open (or create) the storage file
    pub fn new_with_path(path: Option<PathBuf>) -> StorageResult<Self> {
        let path = path.unwrap_or_else(Self::default_storage_path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create storage parent directory: {}", e))
            })?;
        }

        let mut map = HashMap::new();
        if path.exists() {
            let s = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("Failed to read storage file: {}", e)))?;
            if !s.trim().is_empty() {
                map = serde_json::from_str::<HashMap<String, String>>(&s).map_err(|e| {
                    StorageError::Json(format!("Failed to parse storage JSON: {}", e))
                })?;
            }
        }
        tracing::debug!("Opened storage {} with {} keys", path.display(), map.len());

        Ok(FileStorage {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_locked(&self, locked: &HashMap<String, String>) -> StorageResult<()> {
        let s = serde_json::to_string_pretty(locked)
            .map_err(|e| StorageError::Json(e.to_string()))?;
        fs::write(&self.path, s).map_err(|e| StorageError::Io(format!("write failed: {}", e)))
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Platform(format!("mutex poisoned: {:?}", e)))
    }
}

impl StorageBackend for FileStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self.lock()?;
        guard.insert(key.to_string(), value.to_string());
        self.flush_locked(&guard)
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self.lock()?;
        if guard.remove(key).is_some() {
            self.flush_locked(&guard)?;
        }
        Ok(())
    }
}

/// Storage at `path`, or at the per-user default location
pub fn default_storage_backend(path: Option<PathBuf>) -> StorageResult<Box<dyn StorageBackend>> {
    Ok(Box::new(FileStorage::new_with_path(path)?))
}
