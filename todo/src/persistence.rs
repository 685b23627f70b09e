//! Saving and hydrating the to-do list.
//!
//! The whole collection is stored as one JSON array under a fixed key. It is
//! read once when a store opens and rewritten after every successful
//! mutation by the effect returned from [`PersistenceHook::persist`].

use crate::types::{TodoAction, TodoItem};
use liststate_core::effect::Effect;
use liststate_core::storage::{KeyValueStore, StorageError, StorageFuture};
use liststate_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default storage key for the to-do list
pub const DEFAULT_STORAGE_KEY: &str = "todos";

/// Encode the collection as a JSON array of item records.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if encoding fails.
pub fn encode_items(items: &[TodoItem]) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(items).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decode a JSON array of item records.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the bytes are not a valid list.
pub fn decode_items(bytes: &[u8]) -> Result<Vec<TodoItem>, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Read the persisted collection.
///
/// Never fails: an absent key yields an empty list, and unreadable or
/// malformed data is logged and discarded.
#[tracing::instrument(skip(storage))]
pub async fn load_items(storage: &dyn KeyValueStore, key: &str) -> Vec<TodoItem> {
    let bytes = match storage.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::debug!("No persisted list, starting empty");
            return Vec::new();
        },
        Err(error) => {
            tracing::warn!(%error, "Could not read persisted list, starting empty");
            metrics::counter!("todo.hydrate.failures").increment(1);
            return Vec::new();
        },
    };

    match decode_items(&bytes) {
        Ok(items) => {
            tracing::info!(count = items.len(), "Hydrated list from storage");
            items
        },
        Err(error) => {
            tracing::warn!(%error, bytes = bytes.len(), "Discarding malformed persisted list");
            metrics::counter!("todo.hydrate.failures").increment(1);
            Vec::new()
        },
    }
}

/// Save-after-mutate hook
///
/// Cloned into every persistence effect. Writes are serialised behind an
/// async mutex and tagged with the state revision; a snapshot older than the
/// newest one already written is skipped, so storage always converges on the
/// latest collection even when effects finish out of order.
#[derive(Clone)]
pub struct PersistenceHook {
    storage: Arc<dyn KeyValueStore>,
    key: Arc<str>,
    retry: RetryPolicy,
    written: Arc<Mutex<u64>>,
}

impl PersistenceHook {
    /// Creates a hook writing to `key` in `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<Arc<str>>) -> Self {
        Self {
            storage,
            key: key.into(),
            retry: RetryPolicy::default(),
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// Sets the retry policy for failed writes
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Storage key this hook writes to
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Effect writing the collection at `revision`
    #[must_use]
    pub fn persist(&self, revision: u64, items: Arc<Vec<TodoItem>>) -> Effect<TodoAction> {
        let hook = self.clone();
        Effect::future(async move { hook.write(revision, &items).await })
    }

    #[tracing::instrument(skip(self, items), fields(key = %self.key, count = items.len()))]
    async fn write(&self, revision: u64, items: &[TodoItem]) -> Option<TodoAction> {
        let mut written = self.written.lock().await;
        if revision <= *written {
            tracing::debug!(written = *written, "Skipping stale snapshot");
            metrics::counter!("todo.persist.skipped_stale").increment(1);
            return None;
        }

        let result = match encode_items(items) {
            Ok(bytes) => {
                let start = std::time::Instant::now();
                let result = retry_with_predicate(
                    &self.retry,
                    || self.storage.save(&self.key, bytes.clone()),
                    StorageError::is_transient,
                )
                .await;
                metrics::histogram!("todo.persist.duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                result
            },
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                *written = revision;
                tracing::debug!("Persisted list");
                metrics::counter!("todo.persist.writes").increment(1);
                Some(TodoAction::Persisted { revision })
            },
            Err(error) => {
                tracing::error!(%error, "Failed to persist list");
                metrics::counter!("todo.persist.failures").increment(1);
                Some(TodoAction::PersistFailed {
                    revision,
                    error: error.to_string(),
                })
            },
        }
    }
}

impl std::fmt::Debug for PersistenceHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceHook")
            .field("key", &self.key)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Check that `key` can name a single file inside a storage directory.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty keys, keys with path
/// separators or parent references, and hidden names.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| Err(StorageError::InvalidKey(format!("{key:?}: {reason}")));

    if key.trim().is_empty() {
        return invalid("key is empty");
    }
    if key.starts_with('.') {
        return invalid("key must not start with '.'");
    }

    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == key => Ok(()),
        _ => invalid("key must be a single file name"),
    }
}

/// Key-value store keeping one JSON file per key in a directory
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so readers never see a half-written list.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Creates a store rooted at `dir`; the directory is created on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read(path?).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn save(&self, key: &str, data: Vec<u8>) -> StorageFuture<'_, ()> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(&self.dir).await?;

            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &data).await?;
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StorageFuture<'_, ()> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(path?).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TodoId;
    use liststate_testing::{test_clock, InMemoryKeyValueStore};
    use liststate_core::environment::Clock;
    use std::time::Duration;

    fn items() -> Vec<TodoItem> {
        vec![
            TodoItem::new(TodoId::new(1), "buy milk", test_clock().now()),
            TodoItem {
                id: TodoId::new(2),
                text: "walk".into(),
                completed: true,
                created_at: None,
            },
        ]
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    async fn run(effect: Effect<TodoAction>) -> Option<TodoAction> {
        match effect {
            Effect::Future(fut) => fut.await,
            other => panic!("expected a future effect, got {other:?}"),
        }
    }

    #[test]
    fn validate_key_rejects_paths() {
        assert!(validate_key("todos").is_ok());
        assert!(validate_key("work-list_2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("  ").is_err());
        assert!(validate_key("../todos").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("..").is_err());
    }

    #[tokio::test]
    async fn load_absent_key_is_empty() {
        let storage = InMemoryKeyValueStore::new();
        assert!(load_items(&storage, DEFAULT_STORAGE_KEY).await.is_empty());
    }

    #[tokio::test]
    async fn load_malformed_data_is_discarded() {
        let storage = InMemoryKeyValueStore::with_value(DEFAULT_STORAGE_KEY, "{not json");
        assert!(load_items(&storage, DEFAULT_STORAGE_KEY).await.is_empty());

        let storage = InMemoryKeyValueStore::with_value(DEFAULT_STORAGE_KEY, r#"{"id": 1}"#);
        assert!(load_items(&storage, DEFAULT_STORAGE_KEY).await.is_empty());
    }

    #[tokio::test]
    async fn load_reads_saved_items() {
        let storage = InMemoryKeyValueStore::with_value(
            DEFAULT_STORAGE_KEY,
            encode_items(&items()).unwrap(),
        );
        assert_eq!(load_items(&storage, DEFAULT_STORAGE_KEY).await, items());
    }

    #[tokio::test]
    async fn persist_writes_and_reports_revision() {
        let storage = InMemoryKeyValueStore::new();
        let hook = PersistenceHook::new(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY);

        let feedback = run(hook.persist(1, Arc::new(items()))).await;

        assert_eq!(feedback, Some(TodoAction::Persisted { revision: 1 }));
        assert_eq!(storage.write_count(), 1);
        let saved = decode_items(&storage.raw(DEFAULT_STORAGE_KEY).unwrap()).unwrap();
        assert_eq!(saved, items());
    }

    #[tokio::test]
    async fn persist_skips_stale_revisions() {
        let storage = InMemoryKeyValueStore::new();
        let hook = PersistenceHook::new(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY);

        let newer = run(hook.persist(2, Arc::new(items()))).await;
        let older = run(hook.persist(1, Arc::new(Vec::new()))).await;

        assert_eq!(newer, Some(TodoAction::Persisted { revision: 2 }));
        assert_eq!(older, None);
        assert_eq!(storage.write_count(), 1);
        assert_eq!(load_items(&storage, DEFAULT_STORAGE_KEY).await, items());
    }

    #[tokio::test]
    async fn persist_retries_transient_failures() {
        let storage = InMemoryKeyValueStore::new();
        storage.fail_next_saves(2);
        let hook = PersistenceHook::new(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY)
            .with_retry(fast_retry(3));

        let feedback = run(hook.persist(1, Arc::new(items()))).await;

        assert_eq!(feedback, Some(TodoAction::Persisted { revision: 1 }));
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn persist_reports_exhausted_retries() {
        let storage = InMemoryKeyValueStore::new();
        storage.fail_next_saves(10);
        let hook = PersistenceHook::new(Arc::new(storage.clone()), DEFAULT_STORAGE_KEY)
            .with_retry(fast_retry(1));

        let feedback = run(hook.persist(4, Arc::new(items()))).await;

        assert!(matches!(
            feedback,
            Some(TodoAction::PersistFailed { revision: 4, ref error }) if error.contains("injected")
        ));
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("data"));

        assert_eq!(store.get("todos").await.unwrap(), None);

        store.save("todos", b"[1]".to_vec()).await.unwrap();
        store.save("todos", b"[2]".to_vec()).await.unwrap();
        assert_eq!(store.get("todos").await.unwrap(), Some(b"[2]".to_vec()));
        assert!(dir.path().join("data").join("todos.json").exists());
        assert!(!dir.path().join("data").join("todos.json.tmp").exists());

        store.delete("todos").await.unwrap();
        store.delete("todos").await.unwrap();
        assert!(!store.exists("todos").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_rejects_bad_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());

        let err = store.save("../escape", b"[]".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!err.is_transient());
    }
}
