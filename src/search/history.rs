//! Search history: a deduplicated, capacity-bounded ring of selections.
//!
//! The ring lives in memory; every mutation is pushed through a
//! [`HistoryStore`] so a restart starts from the last persisted state.
//! Persistence is best effort, a failed save never fails the selection
//! that triggered it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::suggest::{Suggestion, SuggestionAction, SuggestionCategory};

/// One remembered selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Display label of the selection.
    pub title: String,
    /// Category the selection came from.
    #[serde(rename = "type")]
    pub category: SuggestionCategory,
    /// When the selection happened, persisted as epoch milliseconds.
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub selected_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// What: Rebuild a selectable dropdown row from this entry.
    ///
    /// Output: A row that replays the recorded selection. Entries keep
    /// only title and category, so book and AI rows route through a
    /// title search rather than a direct open.
    #[must_use]
    pub fn to_suggestion(&self) -> Suggestion {
        let action = match self.category {
            SuggestionCategory::Author => SuggestionAction::FilterByAuthor {
                name: self.title.clone(),
            },
            SuggestionCategory::Category => SuggestionAction::FilterByCategory {
                name: self.title.clone(),
            },
            SuggestionCategory::Book | SuggestionCategory::AiHint => SuggestionAction::RunSearch {
                query: self.title.clone(),
            },
        };
        Suggestion {
            category: self.category,
            title: self.title.clone(),
            subtitle: self.category.label().to_string(),
            action,
        }
    }
}

/// Durable backing for the history ring.
pub trait HistoryStore: Send + 'static {
    /// Read the persisted entries, newest first. Failures yield an empty
    /// history.
    fn load(&self) -> Vec<HistoryEntry>;
    /// Persist the entries, newest first. Best effort.
    fn save(&self, entries: &[HistoryEntry]);
}

/// History persisted as one JSON array on disk.
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    /// Store backed by `path`; parent directories are created on save.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl HistoryStore for JsonFileHistory {
    fn load(&self) -> Vec<HistoryEntry> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no history file, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history file unreadable, starting empty");
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[HistoryEntry]) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "cannot create history directory");
                return;
            }
        }
        let body = match serde_json::to_string(entries) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "cannot encode history");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, body) {
            warn!(path = %self.path.display(), error = %err, "cannot write history file");
        }
    }
}

/// In-memory store, shared by clone. Lets tests observe exactly what was
/// persisted without touching the filesystem.
#[derive(Clone, Default)]
pub struct MemoryHistory {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl MemoryHistory {
    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<HistoryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Copy of the persisted entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.guard().clone()
    }
}

impl HistoryStore for MemoryHistory {
    fn load(&self) -> Vec<HistoryEntry> {
        self.snapshot()
    }

    fn save(&self, entries: &[HistoryEntry]) {
        *self.guard() = entries.to_vec();
    }
}

/// The history ring itself: newest first, deduplicated on
/// (title, category), truncated to capacity.
pub struct SearchHistory<H> {
    store: H,
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl<H: HistoryStore> SearchHistory<H> {
    /// Load the persisted ring, dropping anything beyond `capacity`.
    #[must_use]
    pub fn load(store: H, capacity: usize) -> Self {
        let mut entries = store.load();
        entries.truncate(capacity);
        Self {
            store,
            entries,
            capacity,
        }
    }

    /// What: Remember one selection.
    ///
    /// Inputs:
    /// - `title`: Display label of the selection.
    /// - `category`: Category it came from.
    ///
    /// Output: The entry sits at the front of the ring; a previous entry
    /// with the same title and category is gone, the oldest entry is gone
    /// when the ring was full.
    pub fn record(&mut self, title: impl Into<String>, category: SuggestionCategory) {
        let title = title.into();
        self.entries
            .retain(|e| !(e.title == title && e.category == category));
        self.entries.insert(
            0,
            HistoryEntry {
                title,
                category,
                selected_at: Utc::now(),
            },
        );
        self.entries.truncate(self.capacity);
        self.store.save(&self.entries);
    }

    /// The newest `limit` entries, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> &[HistoryEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    /// Forget one entry. Returns whether anything was removed.
    pub fn remove(&mut self, title: &str, category: SuggestionCategory) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.title == title && e.category == category));
        let removed = self.entries.len() != before;
        if removed {
            self.store.save(&self.entries);
        }
        removed
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.store.save(&self.entries);
    }

    /// Number of remembered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
