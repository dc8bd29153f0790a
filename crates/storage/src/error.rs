//! Storage error type shared by all [`LocalStore`](crate::LocalStore) backends.

use std::fmt;

/// Errors that can occur when reading or writing a local store.
#[derive(Debug)]
pub enum StorageError {
    /// The backing file could not be read or written.
    Io(std::io::Error),

    /// The backing file exists but does not hold a JSON string map.
    Serialization(String),

    /// A stored value failed domain validation (e.g. a corrupt key).
    Corrupt { key: String, reason: String },

    /// The store's lock was poisoned by a panicking writer.
    Poisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O failed: {e}"),
            Self::Serialization(detail) => write!(f, "serialization error: {detail}"),
            Self::Corrupt { key, reason } => write!(f, "corrupt value under '{key}': {reason}"),
            Self::Poisoned => write!(f, "storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
