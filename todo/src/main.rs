//! Interactive to-do shell.
//!
//! Reads one command per line from stdin and renders the list after every
//! change. The list is stored under `TODO_DATA_DIR` and survives restarts.

use anyhow::Context;
use liststate_core::environment::{Clock, SystemClock};
use liststate_todo::remote::SimulatedApi;
use liststate_todo::ui::{self, Command, EditBuffer, EditIntent, ParseError};
use liststate_todo::{FileKeyValueStore, Filter, ListStateStore, TodoConfig};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shell state owned by the UI, not the store
struct Shell {
    store: ListStateStore,
    api: SimulatedApi,
    filter: Filter,
    editing: Option<EditBuffer>,
}

impl Shell {
    async fn show_list(&self) {
        let items = self.store.view(self.filter).await;
        let stats = self.store.stats().await;
        print!("{}", ui::render_list(&items, self.filter, &stats));
    }

    async fn report_rejection(&self) {
        if let Some(error) = self.store.last_error().await {
            println!("Not changed: {error}");
        }
    }

    /// Runs one command; returns `false` when the shell should exit
    async fn execute(&mut self, command: Command) -> anyhow::Result<bool> {
        match command {
            Command::Add(text) => {
                if self.store.add(text).await?.is_none() {
                    self.report_rejection().await;
                }
                self.show_list().await;
            },
            Command::Toggle(id) => {
                if !self.store.toggle(id).await? {
                    self.report_rejection().await;
                }
                self.show_list().await;
            },
            Command::Edit(id) => {
                let snapshot = self.store.snapshot().await;
                match snapshot.iter().find(|item| item.id == id) {
                    Some(item) => {
                        println!("Editing {id}: {}", item.text);
                        println!("Type the new text (ESC or :cancel to cancel).");
                        self.editing = Some(EditBuffer::begin(item));
                    },
                    None => println!("No item with id {id}"),
                }
            },
            Command::Remove(id) => {
                if !self.store.remove(id).await? {
                    self.report_rejection().await;
                }
                self.show_list().await;
            },
            Command::ToggleAll => {
                self.store.toggle_all().await?;
                self.show_list().await;
            },
            Command::ClearCompleted => {
                let removed = self.store.clear_completed().await?;
                println!("Removed {removed} completed task(s).");
                self.show_list().await;
            },
            Command::Filter(filter) => {
                self.filter = filter;
                self.show_list().await;
            },
            Command::List => self.show_list().await,
            Command::Stats => print!("{}", ui::render_stats(&self.store.stats().await)),
            Command::Fetch => {
                println!("Loading...");
                match self.api.fetch().await {
                    Ok(data) => println!(
                        "#{} {} ({})",
                        data.id,
                        data.message,
                        data.timestamp.to_rfc3339()
                    ),
                    Err(error) => println!("Error: {error}"),
                }
            },
            Command::Help => print!("{}", ui::HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    async fn continue_edit(&mut self, line: &str) -> anyhow::Result<()> {
        let Some(buffer) = self.editing.as_mut() else {
            return Ok(());
        };

        let (text, key) = ui::edit_line(line);
        if let Some(text) = text {
            buffer.set_text(text);
        }

        match buffer.on_key(key) {
            EditIntent::Save { id, text } => {
                self.editing = None;
                if !self.store.edit(id, text).await? {
                    self.report_rejection().await;
                }
                self.show_list().await;
            },
            EditIntent::KeepEditing { reason } => println!("{reason}"),
            EditIntent::Cancel => {
                self.editing = None;
                println!("Edit cancelled.");
            },
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TodoConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(data_dir = %config.data_dir.display(), key = %config.storage_key, "Starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = Arc::new(FileKeyValueStore::new(&config.data_dir));
    let store = ListStateStore::open(storage, Arc::clone(&clock), config.store_options()).await;

    let mut shell = Shell {
        store: store.clone(),
        api: SimulatedApi::new(config.fetch_latency_scale, clock),
        filter: Filter::All,
        editing: None,
    };

    println!("=== To-do list ===  (type 'help' for commands)\n");
    shell.show_list().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", if shell.editing.is_some() { "edit> " } else { "> " });
        std::io::stdout().flush().context("writing prompt")?;

        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };

        if shell.editing.is_some() {
            shell.continue_edit(&line).await?;
            continue;
        }

        match Command::parse(&line) {
            Ok(command) => {
                if !shell.execute(command).await? {
                    break;
                }
            },
            Err(ParseError::Empty) => {},
            Err(error) => println!("{error}"),
        }
    }

    store.flush().await;
    if let Some(error) = store.last_persist_error().await {
        tracing::error!(%error, "Latest changes were not saved");
    }
    store.close().await.context("shutting down store")?;

    println!("Bye!");
    Ok(())
}
