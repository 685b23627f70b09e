//! A to-do list store built on the liststate reducer architecture.
//!
//! The list is an ordered collection of items with a text and a completed
//! flag. It supports:
//!
//! - Adding, toggling, editing and removing items
//! - Bulk toggle-all and clear-completed
//! - Derived views (`All`, `Active`, `Completed`) and aggregate stats
//! - Hydration from a key-value store at start and a full rewrite after every
//!   successful mutation
//!
//! # Quick Start
//!
//! ```no_run
//! use liststate_core::environment::SystemClock;
//! use liststate_todo::{FileKeyValueStore, Filter, ListStateOptions, ListStateStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(FileKeyValueStore::new(".liststate"));
//! let store = ListStateStore::open(storage, Arc::new(SystemClock), ListStateOptions::default()).await;
//!
//! if let Some(item) = store.add("Buy milk").await? {
//!     store.toggle(item.id).await?;
//! }
//!
//! let stats = store.stats().await;
//! println!("{} of {} done", stats.completed, stats.total);
//! for item in store.view(Filter::Active).await {
//!     println!("{}", item.text);
//! }
//! store.flush().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod persistence;
pub mod reducer;
pub mod remote;
pub mod store;
pub mod types;
pub mod ui;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigError, TodoConfig};
pub use persistence::{FileKeyValueStore, PersistenceHook};
pub use reducer::{TodoEnvironment, TodoReducer};
pub use store::{ListStateOptions, ListStateStore};
pub use types::{
    Change, Filter, InsertionOrder, TodoAction, TodoError, TodoId, TodoItem, TodoState, TodoStats,
};
