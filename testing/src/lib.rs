//! # Liststate Testing
//!
//! Testing utilities and helpers for the liststate architecture.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clocks, key-value storage)
//! - The [`ReducerTest`] Given-When-Then harness
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use liststate_testing::{test_clock, InMemoryKeyValueStore};
//!
//! #[tokio::test]
//! async fn add_persists() {
//!     let storage = InMemoryKeyValueStore::new();
//!     let store = open_store(storage.clone(), test_clock()).await;
//!     store.add("buy milk").await?;
//!     store.flush().await;
//!     assert_eq!(storage.write_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use liststate_core::environment::Clock;


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use liststate_core::storage::{KeyValueStore, StorageError, StorageFuture};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use liststate_testing::mocks::FixedClock;
    /// use liststate_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// In-memory key-value store for tests.
    ///
    /// Clones share the same underlying map, so a test can keep one handle for
    /// assertions while the store under test owns another. Every successful
    /// `save` is counted, which lets tests assert that no persistence write
    /// happened.
    #[derive(Clone, Debug, Default)]
    pub struct InMemoryKeyValueStore {
        data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        writes: Arc<AtomicUsize>,
        failures_remaining: Arc<AtomicUsize>,
    }

    impl InMemoryKeyValueStore {
        /// Create a new empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a store pre-seeded with one value
        #[must_use]
        pub fn with_value(key: &str, data: impl Into<Vec<u8>>) -> Self {
            let store = Self::new();
            store.entries().insert(key.to_string(), data.into());
            store
        }

        /// Make the next `count` saves fail with a backend error
        pub fn fail_next_saves(&self, count: usize) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Number of successful saves so far
        #[must_use]
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Current raw value for `key`
        #[must_use]
        pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
            self.entries().get(key).cloned()
        }

        /// Current value for `key` decoded as UTF-8 (lossy)
        #[must_use]
        pub fn text(&self, key: &str) -> Option<String> {
            self.raw(key)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        }

        /// Check if a key exists in the store
        #[must_use]
        pub fn contains_key(&self, key: &str) -> bool {
            self.entries().contains_key(key)
        }

        // A poisoned lock only means another test thread panicked mid-insert;
        // the map itself is still usable.
        fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
            self.data
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        fn take_failure(&self) -> bool {
            self.failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl KeyValueStore for InMemoryKeyValueStore {
        fn get(&self, key: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
            let value = self.raw(key);
            Box::pin(async move { Ok(value) })
        }

        fn save(&self, key: &str, data: Vec<u8>) -> StorageFuture<'_, ()> {
            let result = if self.take_failure() {
                Err(StorageError::Backend("injected save failure".to_string()))
            } else {
                self.entries().insert(key.to_string(), data);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            };
            Box::pin(async move { result })
        }

        fn delete(&self, key: &str) -> StorageFuture<'_, ()> {
            self.entries().remove(key);
            Box::pin(async { Ok(()) })
        }
    }
}

/// Property-based testing strategies
pub mod properties {
    use proptest::prelude::*;

    /// Input text as a user might type it: mostly real words, sometimes
    /// blank or whitespace-only.
    pub fn text_input() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "[a-z]{1,8}( [a-z]{1,8}){0,3}",
            1 => "[ \t]{0,4}",
            1 => " {1,2}[a-z]{1,6} {1,2}",
        ]
    }

    /// Input text guaranteed to be non-blank after trimming
    pub fn non_blank_text() -> impl Strategy<Value = String> {
        "[a-z]{1,8}( [a-z]{1,8}){0,3}"
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, InMemoryKeyValueStore};
