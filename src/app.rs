//! Application runtime (mode dispatch, live watch loop, one-shot search).
//!
//! This module holds everything the binary does after argument parsing so
//! that the entrypoint stays minimal.

use std::path::{Path, PathBuf};
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

use tokio::select;

use crate::args::Args;
use crate::channel::{ChannelState, LiveChannel};
use crate::config::{self, Settings};
use crate::event::InboundEvent;
use crate::net::{HttpApiClient, TcpChannelTransport};
use crate::search::history::{HistoryEntry, JsonFileHistory};
use crate::search::suggest::{SuggestionCategory, SuggestionList};
use crate::search::{SearchCoordinator, SearchUpdate};

/// What: Run the client in the mode selected by the arguments.
///
/// Inputs:
/// - `args`: Parsed command line.
/// - `config_dir`: Directory holding `settings.conf` and the search history file.
///
/// Output: `Ok(())` on clean shutdown.
///
/// Details:
/// - `--server` overrides the configured server URL before either mode starts.
/// - `--search QUERY` runs one search and exits; otherwise the live watch
///   loop runs until interrupted.
///
/// # Errors
/// - Propagates HTTP client construction failures.
pub async fn run(args: Args, config_dir: PathBuf) -> Result<()> {
    let mut settings = Settings::load(&config::settings_path(&config_dir));
    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(query) = args.search {
        search_once(&settings, &config_dir, &query, args.no_ai).await
    } else {
        watch(&settings).await
    }
}

/// Follow live dashboard events until interrupted, printing state
/// transitions and decoded events as they arrive.
async fn watch(settings: &Settings) -> Result<()> {
    let snapshots = HttpApiClient::new(&settings.server_url)?;
    let channel = LiveChannel::new(settings.channel_config(), TcpChannelTransport, snapshots);
    let (_subscriber, mut events) = channel.subscribe();
    let mut states = channel.watch_state();
    channel.start();
    println!("watching {} (ctrl-c to quit)", settings.server_url);
    loop {
        select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                describe_state(*states.borrow_and_update());
            }
            maybe_event = events.recv() => match maybe_event {
                Some(event) => describe_event(&event),
                None => break,
            },
        }
    }
    channel.stop();
    Ok(())
}

fn describe_state(state: ChannelState) {
    match state {
        ChannelState::Connecting => println!(":: connecting"),
        ChannelState::Open => println!(":: live"),
        ChannelState::Reconnecting(attempt) => println!(":: reconnecting (attempt {attempt})"),
        ChannelState::PollingFallback => println!(":: polling fallback"),
        ChannelState::Closed => println!(":: closed"),
    }
}

fn describe_event(event: &InboundEvent) {
    match event {
        InboundEvent::KpiUpdate(snapshot) => {
            let parts: Vec<String> = snapshot
                .values
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("kpi {}", parts.join(" "));
        }
        InboundEvent::NewTransaction(tx) => {
            println!("{} {} by {}", tx.kind, tx.book_title, tx.member_name);
        }
        InboundEvent::UserActivity(activity) => {
            println!("[{}] {}", activity.timestamp.format("%H:%M:%S"), activity.message);
        }
        InboundEvent::SystemAlert(alert) => {
            println!("alert {} {}: {}", alert.level, alert.title, alert.message);
        }
        InboundEvent::BookStatusChange(change) => {
            println!("book {} is now {}", change.isbn, change.status);
        }
        InboundEvent::Heartbeat => tracing::debug!("server heartbeat"),
    }
}

/// One-shot search: feed the query through the coordinator and print the
/// first terminal update.
async fn search_once(
    settings: &Settings,
    config_dir: &Path,
    query: &str,
    no_ai: bool,
) -> Result<()> {
    let backend = HttpApiClient::new(&settings.server_url)?;
    let mut search_cfg = settings.search_config();
    search_cfg.debounce = Duration::ZERO;
    if no_ai {
        search_cfg.include_ai = false;
    }
    let min_query_len = search_cfg.min_query_len;
    let store = JsonFileHistory::new(config::history_path(config_dir));
    let (handle, mut updates) = SearchCoordinator::spawn(search_cfg, backend, store);
    handle.input(query);
    while let Some(update) = updates.recv().await {
        match update {
            SearchUpdate::Loading { query } => println!("searching for {query} ..."),
            SearchUpdate::Results { query, list } => {
                describe_results(&query, &list);
                break;
            }
            SearchUpdate::Failed { query, message } => {
                eprintln!("search for {query} failed: {message}");
                break;
            }
            SearchUpdate::History { entries } => {
                println!("query shorter than {min_query_len} characters, showing recent searches");
                describe_history(&entries);
                break;
            }
            SearchUpdate::Cursor { .. } | SearchUpdate::Action(_) => {}
        }
    }
    Ok(())
}

fn describe_results(query: &str, list: &SuggestionList) {
    if list.is_empty() {
        println!("no matches for {query}");
        return;
    }
    let mut group: Option<SuggestionCategory> = None;
    for item in &list.items {
        if group != Some(item.category) {
            println!("{}:", item.category.label());
            group = Some(item.category);
        }
        if item.subtitle.is_empty() {
            println!("  {}", item.title);
        } else {
            println!("  {} ({})", item.title, item.subtitle);
        }
    }
}

fn describe_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("no recent searches");
        return;
    }
    println!("recent searches:");
    for entry in entries {
        println!("  {} [{}]", entry.title, entry.category.label());
    }
}
