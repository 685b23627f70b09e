//! Domain types for the to-do list.
//!
//! A to-do list is an ordered collection of items, each with a mutable text
//! and completed flag. The collection lives behind an `Arc` so that snapshots
//! handed to readers stay untouched when the reducer produces the next state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Unique identifier for a to-do item
///
/// Identifiers are derived from the creation timestamp in milliseconds and
/// are strictly increasing within one list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(u64);

impl TodoId {
    /// Creates a `TodoId` from its raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TodoId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A single to-do item
///
/// Serialized with camelCase field names; `createdAt` is optional because
/// lists written by older clients do not carry it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Unique identifier
    pub id: TodoId,
    /// Text as entered by the user
    pub text: String,
    /// Whether the item is completed
    #[serde(default)]
    pub completed: bool,
    /// When the item was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    /// Creates a new, active item
    #[must_use]
    pub fn new(id: TodoId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            created_at: Some(created_at),
        }
    }
}

/// Where `add` places new items
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertionOrder {
    /// New items go to the end of the list
    #[default]
    Append,
    /// New items go to the front ("most recent first")
    Prepend,
}

impl FromStr for InsertionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "prepend" => Ok(Self::Prepend),
            other => Err(format!("unknown insertion order '{other}' (expected append or prepend)")),
        }
    }
}

/// Derived view selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Every item
    #[default]
    All,
    /// Items not yet completed
    Active,
    /// Completed items
    Completed,
}

impl Filter {
    /// Whether `item` belongs to this view
    #[must_use]
    pub const fn matches(self, item: &TodoItem) -> bool {
        match self {
            Self::All => true,
            Self::Active => !item.completed,
            Self::Completed => item.completed,
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(format!("unknown filter '{other}' (expected all, active or completed)")),
        }
    }
}

/// Aggregate counts over the whole list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    /// Number of items
    pub total: usize,
    /// Number of completed items
    pub completed: usize,
    /// Number of active items
    pub active: usize,
    /// `completed / total` as a percentage, rounded half up; 0 for an empty list
    pub percent_complete: u8,
}

impl TodoStats {
    /// Computes the stats for a list of items
    #[must_use]
    pub fn from_items(items: &[TodoItem]) -> Self {
        let total = items.len();
        let completed = items.iter().filter(|item| item.completed).count();
        Self {
            total,
            completed,
            active: total - completed,
            percent_complete: percent_rounded(completed, total),
        }
    }

    /// Whether the list is non-empty and every item is completed
    #[must_use]
    pub const fn all_completed(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// `round(part / whole * 100)` with halves rounded up, in integer arithmetic.
fn percent_rounded(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let rounded = (part * 200 + whole) / (whole * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

/// Rejected commands, recorded in [`TodoState::last_error`]
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TodoError {
    /// The text was empty or whitespace only
    #[error("cannot save empty text")]
    EmptyText,

    /// No item has this id
    #[error("no item with id {0}")]
    NotFound(TodoId),
}

/// What the last accepted command changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// A new item was created
    Added(TodoItem),
    /// An item's completed flag was flipped
    Toggled {
        /// Item that changed
        id: TodoId,
        /// New value of the flag
        completed: bool,
    },
    /// An item's text was replaced
    Edited(TodoId),
    /// An item was removed
    Removed(TodoId),
    /// Every item was set to the same completed value
    ToggledAll {
        /// Value applied to every item
        completed: bool,
    },
    /// Completed items were removed
    ClearedCompleted {
        /// Number of items removed
        removed: usize,
    },
}

/// State of the to-do list
#[derive(Clone, Debug, Default)]
pub struct TodoState {
    /// The ordered collection (copy-on-write)
    pub items: Arc<Vec<TodoItem>>,
    /// Highest id issued so far
    pub last_id: u64,
    /// Incremented after every successful mutation
    pub revision: u64,
    /// Where new items are placed
    pub insertion_order: InsertionOrder,
    /// Outcome of the last accepted command, `None` after a no-op
    pub last_change: Option<Change>,
    /// Last rejected command; cleared by the next successful mutation
    pub last_error: Option<TodoError>,
    /// Newest revision confirmed written to storage
    pub persisted_revision: u64,
    /// Message of the last failed persistence write, cleared on success
    pub last_persist_error: Option<String>,
}

impl TodoState {
    /// Creates a new empty list with the default insertion order
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from hydrated items
    ///
    /// Later duplicates of an id are dropped so ids stay unique.
    #[must_use]
    pub fn from_items(items: Vec<TodoItem>, insertion_order: InsertionOrder) -> Self {
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        let items: Vec<TodoItem> = items
            .into_iter()
            .filter(|item| seen.insert(item.id))
            .collect();
        let last_id = items.iter().map(|item| item.id.get()).max().unwrap_or(0);

        Self {
            items: Arc::new(items),
            last_id,
            insertion_order,
            ..Self::default()
        }
    }

    /// Sets the insertion order
    #[must_use]
    pub fn with_insertion_order(mut self, insertion_order: InsertionOrder) -> Self {
        self.insertion_order = insertion_order;
        self
    }

    /// Returns the number of items
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns the number of completed items
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.completed).count()
    }

    /// Returns an item by id
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items matching `filter`, in list order
    #[must_use]
    pub fn view(&self, filter: Filter) -> Vec<TodoItem> {
        self.items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    /// Aggregate counts
    #[must_use]
    pub fn stats(&self) -> TodoStats {
        TodoStats::from_items(&self.items)
    }

    /// Next id: the clock's millisecond timestamp, bumped past the last id
    /// when the clock has not moved forward.
    ///
    /// Once `last_id` is `u64::MAX` there is nothing above it, so the
    /// smallest id not held by any item is reused instead.
    #[must_use]
    pub fn next_id(&self, now: DateTime<Utc>) -> TodoId {
        let Some(floor) = self.last_id.checked_add(1) else {
            return self.smallest_free_id();
        };
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        TodoId(millis.max(floor))
    }

    fn smallest_free_id(&self) -> TodoId {
        let taken: std::collections::HashSet<u64> =
            self.items.iter().map(|item| item.id.get()).collect();
        (1..=u64::MAX)
            .find(|candidate| !taken.contains(candidate))
            .map_or(TodoId(0), TodoId)
    }
}

/// Actions handled by the to-do reducer
///
/// Commands come from the application; `Persisted` and `PersistFailed` are
/// fed back by the persistence effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TodoAction {
    // ========== Commands ==========
    /// Add a new item
    Add {
        /// Raw text; rejected when blank after trimming
        text: String,
    },

    /// Flip the completed flag of one item
    Toggle {
        /// Item to toggle
        id: TodoId,
    },

    /// Replace the text of one item
    Edit {
        /// Item to edit
        id: TodoId,
        /// New text; rejected when blank after trimming
        text: String,
    },

    /// Remove one item
    Remove {
        /// Item to remove
        id: TodoId,
    },

    /// Complete every item, or reactivate every item if all are completed
    ToggleAll,

    /// Remove every completed item
    ClearCompleted,

    // ========== Persistence feedback ==========
    /// The collection at `revision` was written to storage
    Persisted {
        /// Revision that was written
        revision: u64,
    },

    /// Writing the collection at `revision` failed after retries
    PersistFailed {
        /// Revision that failed
        revision: u64,
        /// Error message
        error: String,
    },
}
