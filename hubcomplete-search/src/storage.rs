//! Durable key-value persistence for cached results and quota state.
//!
//! [`FileStore`] keeps one file per key in a directory and replaces files
//! through a temp-file rename, so a crash mid-write leaves either the old
//! record or the new one. [`MemoryStore`] backs tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SearchError;

/// Suffix appended to every file written by [`FileStore`].
const FILE_SUFFIX: &str = ".json";

/// A string-to-string persistence layer.
///
/// Every method may fail with [`SearchError::StorageUnavailable`]; callers
/// in this crate log and swallow those failures.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, SearchError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), SearchError>;

    /// Delete a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), SearchError>;

    /// List every stored key.
    fn keys(&self) -> Result<Vec<String>, SearchError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SearchError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SearchError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SearchError> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, SearchError> {
        Ok(self.entries().keys().cloned().collect())
    }
}

/// Directory-backed store: one `<percent-encoded key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::StorageUnavailable`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SearchError::StorageUnavailable(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    /// Directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{FILE_SUFFIX}", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SearchError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SearchError::StorageUnavailable(format!(
                "cannot read {key}: {e}"
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SearchError> {
        write_atomic(&self.path_for(key), value)
            .map_err(|e| SearchError::StorageUnavailable(format!("cannot write {key}: {e}")))
    }

    fn remove(&self, key: &str) -> Result<(), SearchError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SearchError::StorageUnavailable(format!(
                "cannot remove {key}: {e}"
            ))),
        }
    }

    fn keys(&self) -> Result<Vec<String>, SearchError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            SearchError::StorageUnavailable(format!("cannot list {}: {e}", self.dir.display()))
        })?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Skip in-progress temp files.
            if name.starts_with('.') {
                continue;
            }
            let Some(encoded) = name.strip_suffix(FILE_SUFFIX) else {
                continue;
            };
            if let Ok(key) = urlencoding::decode(encoded) {
                keys.push(key.into_owned());
            }
        }
        Ok(keys)
    }
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    // Leading dot keeps in-progress files out of `keys()`.
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
