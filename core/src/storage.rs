//! Key-value persistence trait and related types.
//!
//! A list-state store keeps its whole collection in a single slot addressed
//! by a fixed key. The slot holds opaque bytes; the domain layer decides the
//! interchange format (JSON for the to-do list).
//!
//! # Implementations
//!
//! - `FileKeyValueStore` (in `liststate-todo`): one file per key, atomic writes
//! - `InMemoryKeyValueStore` (in `liststate-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! store can be held as `Arc<dyn KeyValueStore>` inside an environment and
//! captured by effects.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`KeyValueStore`] methods
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors that can occur during key-value storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The key cannot be used as a storage address.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same operation could succeed.
    ///
    /// Bad keys and unencodable values fail the same way every time.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend(_))
    }
}

/// Persistent key-value slot storage.
///
/// Writes are whole-value replacements: `save` upserts the full value for a
/// key. There is no incremental or delta persistence.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> StorageFuture<'_, Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    fn save(&self, key: &str, data: Vec<u8>) -> StorageFuture<'_, ()>;

    /// Remove the value stored under `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be modified.
    fn delete(&self, key: &str) -> StorageFuture<'_, ()>;

    /// Check whether a value is stored under `key`.
    ///
    /// Default implementation uses [`KeyValueStore::get`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the check fails.
    fn exists(&self, key: &str) -> StorageFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.get(&key).await?.is_some()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore(Mutex<HashMap<String, Vec<u8>>>);

    impl KeyValueStore for MapStore {
        fn get(&self, key: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
            let value = self.0.lock().map_err(|e| StorageError::Backend(e.to_string()));
            let result = value.map(|map| map.get(key).cloned());
            Box::pin(async move { result })
        }

        fn save(&self, key: &str, data: Vec<u8>) -> StorageFuture<'_, ()> {
            let result = self
                .0
                .lock()
                .map(|mut map| {
                    map.insert(key.to_string(), data);
                })
                .map_err(|e| StorageError::Backend(e.to_string()));
            Box::pin(async move { result })
        }

        fn delete(&self, key: &str) -> StorageFuture<'_, ()> {
            let result = self
                .0
                .lock()
                .map(|mut map| {
                    map.remove(key);
                })
                .map_err(|e| StorageError::Backend(e.to_string()));
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn default_exists_uses_get() {
        let store = MapStore(Mutex::new(HashMap::new()));
        assert!(!store.exists("todos").await.unwrap_or(true));

        store.save("todos", b"[]".to_vec()).await.ok();
        assert!(store.exists("todos").await.unwrap_or(false));

        store.delete("todos").await.ok();
        assert!(!store.exists("todos").await.unwrap_or(true));
    }

    #[test]
    fn io_errors_convert() {
        let err: StorageError = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "I/O error: disk full");
        assert!(err.is_transient());
        assert!(!StorageError::InvalidKey("../x".into()).is_transient());
    }
}
