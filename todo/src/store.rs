//! `ListStateStore`: the application-facing handle to a to-do list.
//!
//! Every operation is one [`TodoAction`] sent through the runtime
//! [`Store`]. Operations that return a value read it under the same lock
//! acquisition as the reduction, so the answer always describes this call.

use crate::persistence::{load_items, PersistenceHook, DEFAULT_STORAGE_KEY};
use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::types::{Change, Filter, InsertionOrder, TodoAction, TodoError, TodoId, TodoItem, TodoState, TodoStats};
use liststate_core::environment::Clock;
use liststate_core::storage::KeyValueStore;
use liststate_runtime::retry::RetryPolicy;
use liststate_runtime::{EffectHandle, Store, StoreConfig, StoreError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Runtime store specialised for the to-do list
pub type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

/// Options for opening a [`ListStateStore`]
#[derive(Debug, Clone)]
pub struct ListStateOptions {
    /// Key of the persisted collection
    pub storage_key: String,
    /// Where new items are placed
    pub insertion_order: InsertionOrder,
    /// Retry policy for failed persistence writes
    pub persist_retry: RetryPolicy,
    /// Runtime configuration
    pub store: StoreConfig,
}

impl Default for ListStateOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            insertion_order: InsertionOrder::default(),
            persist_retry: RetryPolicy::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ListStateOptions {
    /// Sets the storage key
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the insertion order
    #[must_use]
    pub fn with_insertion_order(mut self, order: InsertionOrder) -> Self {
        self.insertion_order = order;
        self
    }

    /// Sets the persistence retry policy
    #[must_use]
    pub fn with_persist_retry(mut self, retry: RetryPolicy) -> Self {
        self.persist_retry = retry;
        self
    }
}

/// Handle to a to-do list
///
/// Cheap to clone; clones share the same list. Rejected commands (blank
/// text, unknown ids) are no-ops reported through return values and
/// [`ListStateStore::last_error`]; `Err` is only returned once the store
/// has been shut down.
#[derive(Clone)]
pub struct ListStateStore {
    store: TodoStore,
    in_flight: Arc<Mutex<Vec<EffectHandle>>>,
}

impl ListStateStore {
    /// Opens a store backed by `storage`, hydrating it from the configured key
    #[tracing::instrument(skip_all, fields(key = %options.storage_key))]
    pub async fn open(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        options: ListStateOptions,
    ) -> Self {
        let items = load_items(storage.as_ref(), &options.storage_key).await;
        let state = TodoState::from_items(items, options.insertion_order);

        let hook = PersistenceHook::new(storage, options.storage_key.as_str())
            .with_retry(options.persist_retry);
        let env = TodoEnvironment::new(clock).with_persistence(hook);

        Self::from_parts(state, env, options.store)
    }

    /// Creates an empty store that never persists
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>, insertion_order: InsertionOrder) -> Self {
        let state = TodoState::new().with_insertion_order(insertion_order);
        Self::from_parts(state, TodoEnvironment::new(clock), StoreConfig::default())
    }

    fn from_parts(state: TodoState, env: TodoEnvironment, config: StoreConfig) -> Self {
        Self {
            store: Store::with_config(state, TodoReducer::new(), env, config),
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds an item; returns `None` when `text` is blank
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self, text))]
    pub async fn add(&self, text: impl Into<String>) -> Result<Option<TodoItem>, StoreError> {
        self.send_then(TodoAction::Add { text: text.into() }, |state| {
            match &state.last_change {
                Some(Change::Added(item)) => Some(item.clone()),
                _ => None,
            }
        })
        .await
    }

    /// Flips the completed flag of `id`; `false` when no such item exists
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, id: TodoId) -> Result<bool, StoreError> {
        self.send_then(TodoAction::Toggle { id }, accepted).await
    }

    /// Replaces the text of `id`; `false` when the text is blank or the id unknown
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self, text))]
    pub async fn edit(&self, id: TodoId, text: impl Into<String>) -> Result<bool, StoreError> {
        let text = text.into();
        self.send_then(TodoAction::Edit { id, text }, accepted).await
    }

    /// Removes `id`; `false` when no such item exists
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: TodoId) -> Result<bool, StoreError> {
        self.send_then(TodoAction::Remove { id }, accepted).await
    }

    /// Completes every item, or reactivates all of them if all are completed
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_all(&self) -> Result<(), StoreError> {
        self.send_then(TodoAction::ToggleAll, |_| ()).await
    }

    /// Removes every completed item; returns how many were removed
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
    #[tracing::instrument(skip(self))]
    pub async fn clear_completed(&self) -> Result<usize, StoreError> {
        self.send_then(TodoAction::ClearCompleted, |state| match state.last_change {
            Some(Change::ClearedCompleted { removed }) => removed,
            _ => 0,
        })
        .await
    }

    /// Items matching `filter`, in list order
    pub async fn view(&self, filter: Filter) -> Vec<TodoItem> {
        self.store.state(|state| state.view(filter)).await
    }

    /// Aggregate counts
    pub async fn stats(&self) -> TodoStats {
        self.store.state(TodoState::stats).await
    }

    /// The whole collection; later mutations never change a returned snapshot
    pub async fn snapshot(&self) -> Arc<Vec<TodoItem>> {
        self.store.state(|state| Arc::clone(&state.items)).await
    }

    /// The most recent rejected command, if no mutation succeeded since
    pub async fn last_error(&self) -> Option<TodoError> {
        self.store.state(|state| state.last_error.clone()).await
    }

    /// Number of successful mutations since the store opened
    pub async fn revision(&self) -> u64 {
        self.store.state(|state| state.revision).await
    }

    /// Newest revision confirmed written to storage
    pub async fn persisted_revision(&self) -> u64 {
        self.store.state(|state| state.persisted_revision).await
    }

    /// Message of the last failed persistence write, if the latest write failed
    pub async fn last_persist_error(&self) -> Option<String> {
        self.store.state(|state| state.last_persist_error.clone()).await
    }

    /// Change notifications
    ///
    /// The value is a sequence number that moves after every processed
    /// action; observers re-read [`view`](Self::view) and
    /// [`stats`](Self::stats) when it changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe_state()
    }

    /// Waits until every persistence write issued so far has completed
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.in_flight());
        for mut handle in handles {
            handle.wait().await;
        }
    }

    /// Stops accepting operations and waits for pending writes
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if writes are still running
    /// when `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }

    /// Shuts down with the configured default timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if writes are still running
    /// when the timeout expires.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.shutdown(self.store.default_shutdown_timeout()).await
    }

    async fn send_then<F, T>(&self, action: TodoAction, read: F) -> Result<T, StoreError>
    where
        F: FnOnce(&TodoState) -> T,
    {
        let (handle, value) = self.store.send_then(action, read).await?;
        if handle.pending() > 0 {
            let mut in_flight = self.in_flight();
            in_flight.retain(|handle| handle.pending() > 0);
            in_flight.push(handle);
        }
        Ok(value)
    }

    fn in_flight(&self) -> MutexGuard<'_, Vec<EffectHandle>> {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ListStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStateStore")
            .field("pending_effects", &self.store.pending_effects())
            .finish_non_exhaustive()
    }
}

fn accepted(state: &TodoState) -> bool {
    state.last_change.is_some()
}
