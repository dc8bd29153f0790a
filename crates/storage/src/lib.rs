//! Profile-local persistence for the login client.
//!
//! The login core persists exactly two things, both small strings:
//!
//! - the realtime client id, created once per profile and reused forever;
//! - optionally, a generated identity key (see `signer::PersistedSecureKeySource`).
//!
//! [`LocalStore`] is the browser-`localStorage`-shaped seam for that. Two
//! backends ship here:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`InMemoryStore`] | tests, ephemeral sessions |
//! | [`FileStore`] | CLI profiles (one JSON object per file) |
//!
//! Session tokens are deliberately not stored here; they live in memory in
//! `sdk::SessionContext` and die with it.

mod error;

pub use error::StorageError;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// String key/value store scoped to one user profile.
///
/// Implementations must be `Send + Sync`; callers that need read-then-write
/// atomicity (e.g. "read id, else generate and persist") hold their own lock
/// around the pair of calls.
pub trait LocalStore: Send + Sync {
    /// Returns the value under `key`, or `None` if unset.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Sets `key` to `value`, replacing any previous value. Durable on return.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// In-memory store backed by `RwLock<BTreeMap>`.
///
/// Suitable for development and testing. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// File-backed store: one JSON object of string values.
///
/// The whole map is cached in memory and rewritten on every mutation via a
/// sibling temp file + rename, so a crash mid-write leaves either the old or
/// the new file, never a torn one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store; the file is created on first write.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Io`] if the file exists but cannot be read.
    /// - [`StorageError::Serialization`] if it is not a JSON string map.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "local store opened");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        let previous = map.insert(key.to_owned(), value.to_owned());
        if let Err(e) = self.flush(&map) {
            // Keep memory consistent with disk.
            match previous {
                Some(old) => map.insert(key.to_owned(), old),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
