//! Terminal rendering and input handling for the to-do shell.
//!
//! The UI owns its transient input: an [`EditBuffer`] holds the text being
//! edited and only hands it to the store on confirm. Rendering reads the
//! derived `view`/`stats` outputs and never touches the store itself.

use crate::types::{Filter, TodoId, TodoItem, TodoStats};
use std::fmt::Write as _;
use thiserror::Error;

/// Message shown when a blank edit is confirmed
pub const EMPTY_TEXT_MESSAGE: &str = "cannot save empty text";

/// Width of the progress bar in characters
const PROGRESS_WIDTH: usize = 20;

/// Keys the edit buffer reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditKey {
    /// Confirm the edit
    Enter,
    /// Cancel the edit
    Escape,
}

/// What the shell should do after a key press in the edit buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditIntent {
    /// Call `edit(id, text)` and leave edit mode
    Save {
        /// Item being edited
        id: TodoId,
        /// Confirmed text
        text: String,
    },
    /// Stay in edit mode and show `reason`
    KeepEditing {
        /// Message for the user
        reason: &'static str,
    },
    /// Leave edit mode without calling `edit`
    Cancel,
}

/// Transient text buffer for editing one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditBuffer {
    id: TodoId,
    original: String,
    text: String,
}

impl EditBuffer {
    /// Starts editing `item`, seeded with its current text
    #[must_use]
    pub fn begin(item: &TodoItem) -> Self {
        Self {
            id: item.id,
            original: item.text.clone(),
            text: item.text.clone(),
        }
    }

    /// Item being edited
    #[must_use]
    pub const fn id(&self) -> TodoId {
        self.id
    }

    /// Current buffer contents
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the buffer contents
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Handles a key press
    ///
    /// `Enter` confirms only non-blank text. `Escape` restores the original
    /// text and cancels.
    pub fn on_key(&mut self, key: EditKey) -> EditIntent {
        match key {
            EditKey::Enter if self.text.trim().is_empty() => EditIntent::KeepEditing {
                reason: EMPTY_TEXT_MESSAGE,
            },
            EditKey::Enter => EditIntent::Save {
                id: self.id,
                text: self.text.clone(),
            },
            EditKey::Escape => {
                self.text.clone_from(&self.original);
                EditIntent::Cancel
            },
        }
    }
}

/// Label for the toggle-all control
#[must_use]
pub const fn toggle_all_label(stats: &TodoStats) -> &'static str {
    if stats.all_completed() {
        "Mark all active"
    } else {
        "Mark all complete"
    }
}

/// Message shown when `filter` selects nothing
#[must_use]
pub const fn empty_message(filter: Filter) -> &'static str {
    match filter {
        Filter::All => "The list is empty.",
        Filter::Active => "No active tasks.",
        Filter::Completed => "No completed tasks.",
    }
}

/// Renders the filtered list
///
/// `stats` describes the whole list, so an empty list is told apart from a
/// filter that matches nothing.
#[must_use]
pub fn render_list(items: &[TodoItem], filter: Filter, stats: &TodoStats) -> String {
    if stats.total == 0 {
        return "The list is empty. Add a new task to get started.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{filter}]  ({} | clear completed: {})",
        toggle_all_label(stats),
        stats.completed
    );

    if items.is_empty() {
        let _ = writeln!(out, "  {}", empty_message(filter));
        return out;
    }

    for item in items {
        let mark = if item.completed { 'x' } else { ' ' };
        let _ = writeln!(out, "  [{mark}] {}  {}", item.id, item.text);
    }
    out
}

/// Renders the aggregate counts with a progress bar
#[must_use]
pub fn render_stats(stats: &TodoStats) -> String {
    let filled = usize::from(stats.percent_complete) * PROGRESS_WIDTH / 100;
    format!(
        "Total: {}  Completed: {}  Active: {}  Done: {}%\n[{}{}]\n",
        stats.total,
        stats.completed,
        stats.active,
        stats.percent_complete,
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled),
    )
}

/// Help text for the shell
pub const HELP: &str = "\
Commands:
  add <text>        add a task
  toggle <id>       complete / reactivate a task
  edit <id>         edit a task (Enter saves, a lone ESC or :cancel cancels)
  rm <id>           delete a task
  all               complete all tasks, or reactivate all if all are done
  clear             delete completed tasks
  filter <name>     show all | active | completed
  list              show the list
  stats             show counts
  fetch             run the simulated remote fetch
  help              show this help
  quit              exit
";

/// Errors from parsing a shell line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line was blank
    #[error("empty command")]
    Empty,

    /// The command word is not known
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    /// A required argument is missing
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    /// The id argument is not a number
    #[error("'{0}' is not a valid id")]
    InvalidId(String),

    /// The filter name is not known
    #[error("{0}")]
    InvalidFilter(String),
}

/// One line of shell input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `add <text>`
    Add(String),
    /// `toggle <id>`
    Toggle(TodoId),
    /// `edit <id>`
    Edit(TodoId),
    /// `rm <id>`
    Remove(TodoId),
    /// `all`
    ToggleAll,
    /// `clear`
    ClearCompleted,
    /// `filter <name>`
    Filter(Filter),
    /// `list`
    List,
    /// `stats`
    Stats,
    /// `fetch`
    Fetch,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

impl Command {
    /// Parses a shell line
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for blank lines, unknown commands and bad
    /// arguments.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_start();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "add" | "a" => {
                if rest.trim().is_empty() {
                    Err(ParseError::MissingArgument("add"))
                } else {
                    Ok(Self::Add(rest.trim_end_matches(['\r', '\n']).to_string()))
                }
            },
            "toggle" | "t" => parse_id("toggle", rest).map(Self::Toggle),
            "edit" | "e" => parse_id("edit", rest).map(Self::Edit),
            "rm" | "remove" | "delete" => parse_id("rm", rest).map(Self::Remove),
            "all" => Ok(Self::ToggleAll),
            "clear" => Ok(Self::ClearCompleted),
            "filter" | "f" => {
                if rest.trim().is_empty() {
                    return Err(ParseError::MissingArgument("filter"));
                }
                rest.parse().map(Self::Filter).map_err(ParseError::InvalidFilter)
            },
            "list" | "ls" => Ok(Self::List),
            "stats" => Ok(Self::Stats),
            "fetch" => Ok(Self::Fetch),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn parse_id(command: &'static str, rest: &str) -> Result<TodoId, ParseError> {
    let raw = rest.trim();
    if raw.is_empty() {
        return Err(ParseError::MissingArgument(command));
    }
    raw.parse()
        .map_err(|_| ParseError::InvalidId(raw.to_string()))
}

/// Maps a line typed while editing to a key press and buffer text
///
/// A lone ESC character or `:cancel` cancels; anything else replaces the
/// buffer and confirms.
#[must_use]
pub fn edit_line(line: &str) -> (Option<String>, EditKey) {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim() == "\u{1b}" || line.trim() == ":cancel" {
        (None, EditKey::Escape)
    } else {
        (Some(line.to_string()), EditKey::Enter)
    }
}
