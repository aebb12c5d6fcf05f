//! Smart-search coordinator: debounced input, one in-flight request, and
//! the suggestion surface state.
//!
//! A single driver task owns the debounce window, the cache, the history
//! ring, and the only in-flight backend call. Every keystroke and key
//! press goes in as a [`SearchCommand`] through [`SearchHandle`]; the
//! surface renders exclusively from the [`SearchUpdate`] stream coming
//! back. Responses carry the token they were issued under, so a result
//! that was superseded while in flight is discarded instead of shown.

pub mod cache;
pub mod history;
pub mod suggest;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::util::{normalize_query, trimmed_len};
use cache::SuggestionCache;
use history::{HistoryEntry, HistoryStore, SearchHistory};
use suggest::{
    SearchResponse, Suggestion, SuggestionAction, SuggestionCategory, SuggestionList,
    merge_response,
};

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Tunables for one coordinator instance.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a query is evaluated.
    pub debounce: Duration,
    /// Minimum trimmed query length; shorter input shows history instead.
    pub min_query_len: usize,
    /// Result cap requested from the backend.
    pub max_results: u32,
    /// Whether AI hints are requested at all.
    pub include_ai: bool,
    /// Number of distinct queries the suggestion cache holds.
    pub cache_capacity: NonZeroUsize,
    /// Optional cache entry lifetime; `None` keeps entries until evicted.
    pub cache_ttl: Option<Duration>,
    /// Size of the history ring.
    pub history_capacity: usize,
    /// Entries shown in the history preview.
    pub history_preview: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            min_query_len: 2,
            max_results: 10,
            include_ai: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: None,
            history_capacity: 20,
            history_preview: 5,
        }
    }
}

/// The search endpoint behind the coordinator.
pub trait SearchBackend: Send + Sync + 'static {
    /// Run one query. Cancellation happens by dropping the future.
    fn search(
        &self,
        query: &str,
        include_ai: bool,
        max_results: u32,
    ) -> impl Future<Output = Result<SearchResponse, SearchError>> + Send;
}

/// Input and key events fed to the driver.
enum SearchCommand {
    Input(String),
    Focus,
    MoveNext,
    MovePrev,
    Confirm,
    Dismiss,
    RemoveHistory {
        title: String,
        category: SuggestionCategory,
    },
    ClearHistory,
}

/// What the suggestion surface should show next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchUpdate {
    /// A request for `query` is in flight; show a spinner.
    Loading {
        /// Trimmed query being fetched.
        query: String,
    },
    /// Fresh rows for `query`. An empty list is the no-results state, not
    /// an error.
    Results {
        /// Trimmed query the rows belong to.
        query: String,
        /// Merged rows with the cursor cleared.
        list: SuggestionList,
    },
    /// Show the history preview instead of suggestions. Preview rows are
    /// selectable; cursor moves and confirms treat them like suggestion
    /// rows.
    History {
        /// Newest-first preview slice.
        entries: Vec<HistoryEntry>,
    },
    /// The request for `query` failed; distinct from empty results.
    Failed {
        /// Trimmed query that failed.
        query: String,
        /// Human-readable reason.
        message: String,
    },
    /// The highlight moved.
    Cursor {
        /// Highlighted row, `None` when nothing is selected.
        index: Option<usize>,
    },
    /// A suggestion was activated; the host should act on it.
    Action(SuggestionAction),
}

/// Cloneable sender half used by the input surface.
#[derive(Clone)]
pub struct SearchHandle {
    tx: mpsc::UnboundedSender<SearchCommand>,
}

impl SearchHandle {
    /// The input field changed to `text`.
    pub fn input(&self, text: impl Into<String>) {
        let _ = self.tx.send(SearchCommand::Input(text.into()));
    }

    /// The input field gained focus.
    pub fn focus(&self) {
        let _ = self.tx.send(SearchCommand::Focus);
    }

    /// Move the highlight down.
    pub fn move_next(&self) {
        let _ = self.tx.send(SearchCommand::MoveNext);
    }

    /// Move the highlight up.
    pub fn move_prev(&self) {
        let _ = self.tx.send(SearchCommand::MovePrev);
    }

    /// Activate the highlighted row, or submit the raw query when nothing
    /// is highlighted.
    pub fn confirm(&self) {
        let _ = self.tx.send(SearchCommand::Confirm);
    }

    /// Close the surface and cancel any in-flight request.
    pub fn dismiss(&self) {
        let _ = self.tx.send(SearchCommand::Dismiss);
    }

    /// Forget one history entry.
    pub fn remove_history(&self, title: impl Into<String>, category: SuggestionCategory) {
        let _ = self.tx.send(SearchCommand::RemoveHistory {
            title: title.into(),
            category,
        });
    }

    /// Forget the whole history.
    pub fn clear_history(&self) {
        let _ = self.tx.send(SearchCommand::ClearHistory);
    }
}

/// Spawns the driver task that owns all coordinator state.
pub struct SearchCoordinator;

impl SearchCoordinator {
    /// What: Start a coordinator.
    ///
    /// Inputs:
    /// - `cfg`: Tunables.
    /// - `backend`: Search endpoint.
    /// - `store`: Durable history backing; loaded once at startup.
    ///
    /// Output: The command handle and the update stream. The driver exits
    /// when every handle clone is dropped.
    #[must_use]
    pub fn spawn<B, H>(
        cfg: SearchConfig,
        backend: B,
        store: H,
    ) -> (SearchHandle, mpsc::UnboundedReceiver<SearchUpdate>)
    where
        B: SearchBackend,
        H: HistoryStore,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let history = SearchHistory::load(store, cfg.history_capacity);
        let cache = SuggestionCache::new(cfg.cache_capacity, cfg.cache_ttl);
        let driver = SearchDriver {
            cfg,
            backend: Arc::new(backend),
            cache,
            history,
            updates: update_tx,
            cmd_rx,
            results_tx,
            results_rx,
            next_token: 1,
            live_token: None,
            inflight: None,
            view: View::History,
            list: SuggestionList::default(),
            query: String::new(),
        };
        tokio::spawn(driver.run());
        (SearchHandle { tx: cmd_tx }, update_rx)
    }
}

/// What the surface is currently showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    History,
    Loading,
    Results,
    Failed,
}

/// How a debounce window ended.
enum Debounced {
    /// The window stayed quiet; evaluate this text.
    Settle(String),
    /// A non-input command interrupted the window; handle it, then resume
    /// with this text.
    Preempt(String, SearchCommand),
    /// The command channel closed.
    Shutdown,
}

type SearchOutcome = (u64, String, Result<SearchResponse, SearchError>);

struct SearchDriver<B, H> {
    cfg: SearchConfig,
    backend: Arc<B>,
    cache: SuggestionCache,
    history: SearchHistory<H>,
    updates: mpsc::UnboundedSender<SearchUpdate>,
    cmd_rx: mpsc::UnboundedReceiver<SearchCommand>,
    results_tx: mpsc::UnboundedSender<SearchOutcome>,
    results_rx: mpsc::UnboundedReceiver<SearchOutcome>,
    /// Next token to issue; tokens are never reused.
    next_token: u64,
    /// Token of the one request whose result is still wanted.
    live_token: Option<u64>,
    /// The single in-flight backend task.
    inflight: Option<JoinHandle<()>>,
    view: View,
    list: SuggestionList,
    /// Last evaluated input text, kept for focus re-runs.
    query: String,
}

impl<B: SearchBackend, H: HistoryStore> SearchDriver<B, H> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    match cmd {
                        SearchCommand::Input(text) => {
                            if !self.input_cycle(text).await {
                                break;
                            }
                        }
                        other => self.apply(other),
                    }
                }
                Some((token, query, outcome)) = self.results_rx.recv() => {
                    self.finish_search(token, query, outcome);
                }
            }
        }
        self.cancel_inflight();
        debug!("search driver exited");
    }

    /// Debounce one burst of typing, then evaluate whatever settled.
    /// Returns `false` when the command channel closed mid-burst.
    async fn input_cycle(&mut self, first: String) -> bool {
        let mut pending = Some(first);
        while let Some(text) = pending.take() {
            match self.debounce_input(text).await {
                Debounced::Settle(query) => self.evaluate(query),
                Debounced::Preempt(latest, cmd) => {
                    let keep = !matches!(cmd, SearchCommand::Dismiss);
                    self.apply(cmd);
                    if keep {
                        pending = Some(latest);
                    }
                }
                Debounced::Shutdown => return false,
            }
        }
        true
    }

    /// Hold the debounce window open, folding newer keystrokes into it.
    /// Each keystroke restarts the window; input below the minimum length
    /// and a zero debounce settle immediately.
    async fn debounce_input(&mut self, first: String) -> Debounced {
        let mut latest = first;
        loop {
            if trimmed_len(&latest) < self.cfg.min_query_len || self.cfg.debounce.is_zero() {
                return Debounced::Settle(latest);
            }
            let window = tokio::time::sleep(self.cfg.debounce);
            tokio::pin!(window);
            tokio::select! {
                () = &mut window => return Debounced::Settle(latest),
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(SearchCommand::Input(newer)) => latest = newer,
                    Some(other) => return Debounced::Preempt(latest, other),
                    None => return Debounced::Shutdown,
                },
            }
        }
    }

    /// Evaluate one settled query: history below the minimum length,
    /// cached rows when available, otherwise a fresh backend request that
    /// supersedes whatever was in flight.
    fn evaluate(&mut self, raw: String) {
        self.query.clone_from(&raw);
        if trimmed_len(&raw) < self.cfg.min_query_len {
            self.cancel_inflight();
            self.view = View::History;
            self.publish_history_preview();
            return;
        }
        self.cancel_inflight();
        let trimmed = raw.trim().to_string();
        let key = normalize_query(&raw);
        if let Some(items) = self.cache.get(&key) {
            debug!(query = %trimmed, "suggestion cache hit");
            self.show_results(trimmed, items);
            return;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.live_token = Some(token);
        self.view = View::Loading;
        self.push(SearchUpdate::Loading {
            query: trimmed.clone(),
        });
        let backend = Arc::clone(&self.backend);
        let results_tx = self.results_tx.clone();
        let include_ai = self.cfg.include_ai;
        let max_results = self.cfg.max_results;
        self.inflight = Some(tokio::spawn(async move {
            let outcome = backend.search(&trimmed, include_ai, max_results).await;
            let _ = results_tx.send((token, trimmed, outcome));
        }));
    }

    /// Resolve one finished backend call, dropping it when a newer query
    /// superseded it while it was in flight.
    fn finish_search(
        &mut self,
        token: u64,
        query: String,
        outcome: Result<SearchResponse, SearchError>,
    ) {
        if self.live_token != Some(token) {
            debug!(token, query = %query, "discarding stale search result");
            return;
        }
        self.live_token = None;
        self.inflight = None;
        match outcome {
            Ok(response) => {
                let items = merge_response(response);
                self.cache.insert(normalize_query(&query), items.clone());
                self.show_results(query, items);
            }
            Err(SearchError::Cancelled) => debug!(query = %query, "search cancelled"),
            Err(err) => {
                warn!(query = %query, error = %err, "search request failed");
                self.view = View::Failed;
                self.list = SuggestionList::default();
                self.push(SearchUpdate::Failed {
                    query,
                    message: err.to_string(),
                });
            }
        }
    }

    /// Non-input commands; all synchronous.
    fn apply(&mut self, cmd: SearchCommand) {
        match cmd {
            // Input that reaches this point already went through a window.
            SearchCommand::Input(text) => self.evaluate(text),
            SearchCommand::Focus => {
                if trimmed_len(&self.query) < self.cfg.min_query_len {
                    self.view = View::History;
                    self.publish_history_preview();
                } else {
                    self.evaluate(self.query.clone());
                }
            }
            SearchCommand::MoveNext => {
                if self.cursor_usable() {
                    self.list.move_next();
                    self.push(SearchUpdate::Cursor {
                        index: self.list.cursor,
                    });
                }
            }
            SearchCommand::MovePrev => {
                if self.cursor_usable() {
                    self.list.move_prev();
                    self.push(SearchUpdate::Cursor {
                        index: self.list.cursor,
                    });
                }
            }
            SearchCommand::Confirm => self.confirm(),
            SearchCommand::Dismiss => {
                self.cancel_inflight();
                self.view = View::History;
                self.list = SuggestionList::default();
            }
            SearchCommand::RemoveHistory { title, category } => {
                if self.history.remove(&title, category) && self.view == View::History {
                    self.publish_history_preview();
                }
            }
            SearchCommand::ClearHistory => {
                self.history.clear();
                if self.view == View::History {
                    self.publish_history_preview();
                }
            }
        }
    }

    /// Activate the highlighted row, falling back to a raw-query search
    /// when nothing is highlighted. Either way the surface closes. A
    /// highlighted history row replays its recorded selection, which
    /// moves it back to the front of the ring.
    fn confirm(&mut self) {
        if self.cursor_usable() {
            if let Some(selected) = self.list.selected() {
                let action = selected.action.clone();
                let title = selected.title.clone();
                let category = selected.category;
                self.history.record(title, category);
                self.view = View::History;
                self.list = SuggestionList::default();
                self.push(SearchUpdate::Action(action));
                return;
            }
        }
        let trimmed = self.query.trim();
        if trimmed_len(&self.query) >= self.cfg.min_query_len {
            let action = SuggestionAction::RunSearch {
                query: trimmed.to_string(),
            };
            self.cancel_inflight();
            self.view = View::History;
            self.list = SuggestionList::default();
            self.push(SearchUpdate::Action(action));
        }
    }

    fn show_results(&mut self, query: String, items: Vec<Suggestion>) {
        self.view = View::Results;
        self.list = SuggestionList::new(items);
        self.push(SearchUpdate::Results {
            query,
            list: self.list.clone(),
        });
    }

    /// Publish the newest entries and rebuild the preview rows the cursor
    /// walks, with no row highlighted.
    fn publish_history_preview(&mut self) {
        let entries = self.history.recent(self.cfg.history_preview).to_vec();
        let rows = entries.iter().map(HistoryEntry::to_suggestion).collect();
        self.list = SuggestionList::new(rows);
        self.push(SearchUpdate::History { entries });
    }

    /// Whether cursor movement and row activation have rows to act on.
    /// Both suggestion lists and the history preview qualify.
    fn cursor_usable(&self) -> bool {
        matches!(self.view, View::Results | View::History) && !self.list.is_empty()
    }

    /// Abort the in-flight request, if any, and forget its token.
    fn cancel_inflight(&mut self) {
        if let Some(task) = self.inflight.take() {
            task.abort();
            debug!("superseded in-flight search");
        }
        self.live_token = None;
    }

    fn push(&self, update: SearchUpdate) {
        if self.updates.send(update).is_err() {
            debug!("search update receiver dropped");
        }
    }
}
