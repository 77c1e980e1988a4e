//! Errors produced by storage backends and the persistence layer.
//!
//! Both enums are `Clone` so they can be published on a broadcast channel
//! to every interested consumer.

use thiserror::Error;

/// Failure reported by a [`StorageAdapter`](super::StorageAdapter).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Problem encountered while hydrating or writing state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode persisted record: {0}")]
    Encode(String),

    #[error("failed to decode persisted record: {0}")]
    Decode(String),

    #[error("persisted version {found} does not match {expected} and no migration is configured")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("migration from version {from} failed: {reason}")]
    Migration { from: u32, reason: String },

    #[error("failed to merge persisted state: {0}")]
    Merge(String),
}
