//! Storage backends.
//!
//! The persistence layer talks to storage through the async
//! [`StorageAdapter`] trait. Synchronous backends implement
//! [`SyncStorage`] and are lifted with [`SyncAdapter`].

use super::error::StorageError;
use crate::core::store::{read, write};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Key-value string storage.
///
/// Implementations must be usable from any thread. A missing key is
/// `Ok(None)`, not an error.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key).await
    }
}

/// Blocking key-value storage.
pub trait SyncStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Exposes a [`SyncStorage`] as a [`StorageAdapter`].
///
/// Calls run inline on the persistence task, so the wrapped backend should
/// be fast (an in-process map, a small file).
pub struct SyncAdapter<T> {
    inner: T,
}

impl<T: SyncStorage> SyncAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: SyncStorage> StorageAdapter for SyncAdapter<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        SyncStorage::get_item(&self.inner, key)
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        SyncStorage::set_item(&self.inner, key, &value)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        SyncStorage::remove_item(&self.inner, key)
    }
}

/// In-process storage.
///
/// Clones share the same map, so a test can keep one clone to inspect
/// what the store wrote. All data is lost when the last clone is dropped.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        read(&self.items).get(key).cloned()
    }

    /// Seed a value without counting it as a write.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        write(&self.items).insert(key.into(), value.into());
    }

    /// Number of successful `set_item` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.items).is_empty()
    }
}

impl SyncStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        write(&self.items).insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        write(&self.items).remove(key);
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        SyncStorage::get_item(self, key)
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        SyncStorage::set_item(self, key, &value)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        SyncStorage::remove_item(self, key)
    }
}
