//! Suggestion model for the smart-search surface.
//!
//! The search endpoint returns two parallel lists, catalog matches and AI
//! hints. [`merge_response`] flattens them into one display list with a
//! fixed category order so the dropdown never reshuffles between
//! keystrokes.

use serde::{Deserialize, Serialize};

/// Display group of one suggestion row. Groups always render in the order
/// books, authors, categories, AI hints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    /// A catalog book match.
    Book,
    /// An author match.
    Author,
    /// A category (genre) match.
    Category,
    /// An AI-generated hint.
    #[serde(rename = "ai")]
    AiHint,
}

impl SuggestionCategory {
    /// Group heading shown above the rows of this category.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "Books",
            Self::Author => "Authors",
            Self::Category => "Categories",
            Self::AiHint => "AI Suggestions",
        }
    }
}

/// What activating a suggestion should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuggestionAction {
    /// Open the detail view of one book.
    OpenBook {
        /// Catalog identifier of the book.
        isbn: String,
    },
    /// Filter the catalog by author.
    FilterByAuthor {
        /// Author display name.
        name: String,
    },
    /// Filter the catalog by category.
    FilterByCategory {
        /// Category display name.
        name: String,
    },
    /// Run a plain catalog search.
    RunSearch {
        /// Query to submit.
        query: String,
    },
    /// Ask for recommendations seeded from one title.
    Recommend {
        /// Title the recommendation is based on.
        based_on: String,
    },
}

/// One row of the suggestion dropdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    /// Display group the row belongs to.
    pub category: SuggestionCategory,
    /// Primary label.
    pub title: String,
    /// Secondary label under the title.
    pub subtitle: String,
    /// What selecting the row does.
    pub action: SuggestionAction,
}

/// Merged suggestion rows plus the wrap-around selection cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuggestionList {
    /// Rows in fixed category order.
    pub items: Vec<Suggestion>,
    /// Highlighted row, if any.
    pub cursor: Option<usize>,
}

impl SuggestionList {
    /// A list with no row highlighted.
    #[must_use]
    pub const fn new(items: Vec<Suggestion>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The highlighted row, if the cursor is on one.
    #[must_use]
    pub fn selected(&self) -> Option<&Suggestion> {
        self.cursor.and_then(|idx| self.items.get(idx))
    }

    /// Move the highlight down one row, entering at the top and wrapping
    /// past the bottom.
    pub fn move_next(&mut self) {
        if self.items.is_empty() {
            self.cursor = None;
            return;
        }
        self.cursor = Some(match self.cursor {
            None => 0,
            Some(idx) => (idx + 1) % self.items.len(),
        });
    }

    /// Move the highlight up one row, entering at the bottom and wrapping
    /// past the top.
    pub fn move_prev(&mut self) {
        if self.items.is_empty() {
            self.cursor = None;
            return;
        }
        let last = self.items.len() - 1;
        self.cursor = Some(match self.cursor {
            None | Some(0) => last,
            Some(idx) => idx - 1,
        });
    }
}

/// Response body of the smart-search endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchResponse {
    /// Catalog matches, mixed types, tagged per element.
    #[serde(default)]
    pub suggestions: Vec<RawSuggestion>,
    /// AI hints, listed after every catalog group.
    #[serde(default)]
    pub ai_suggestions: Vec<RawAiSuggestion>,
}

/// One catalog match as sent by the server.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawSuggestion {
    /// A book row.
    Book {
        /// Book title.
        title: String,
        /// Author line, may be empty.
        #[serde(default)]
        authors: String,
        /// Catalog identifier, may be empty for ghost entries.
        #[serde(default)]
        isbn: String,
    },
    /// An author row.
    Author {
        /// Author name.
        name: String,
        /// Number of catalog books by this author.
        #[serde(default)]
        book_count: u32,
    },
    /// A category row.
    Category {
        /// Category name.
        name: String,
        /// Number of catalog books in this category.
        #[serde(default)]
        book_count: u32,
    },
}

/// One AI hint as sent by the server.
#[derive(Clone, Debug, Deserialize)]
pub struct RawAiSuggestion {
    /// Hint label.
    #[serde(default)]
    pub title: String,
    /// Why the hint was produced.
    #[serde(default)]
    pub reason: String,
    /// Suggested verb, `search` or `recommend`.
    #[serde(default)]
    pub action: String,
    /// Query to run for `search` hints.
    #[serde(default)]
    pub query: String,
}

fn count_label(count: u32) -> String {
    if count == 1 {
        "1 book".to_string()
    } else {
        format!("{count} books")
    }
}

fn hint_row(raw: RawAiSuggestion) -> Suggestion {
    let action = match raw.action.as_str() {
        "recommend" => SuggestionAction::Recommend {
            based_on: raw.title.clone(),
        },
        "search" if !raw.query.is_empty() => SuggestionAction::RunSearch { query: raw.query },
        // Unknown verbs degrade to a plain search for the hint label.
        _ => SuggestionAction::RunSearch {
            query: raw.title.clone(),
        },
    };
    Suggestion {
        category: SuggestionCategory::AiHint,
        title: raw.title,
        subtitle: raw.reason,
        action,
    }
}

/// What: Flatten a search response into display rows.
///
/// Inputs:
/// - `response`: Decoded endpoint body.
///
/// Output: Rows grouped as books, then authors, then categories, then AI
/// hints, each group keeping the server's relative order.
#[must_use]
pub fn merge_response(response: SearchResponse) -> Vec<Suggestion> {
    let mut books = Vec::new();
    let mut authors = Vec::new();
    let mut categories = Vec::new();
    for raw in response.suggestions {
        match raw {
            RawSuggestion::Book {
                title,
                authors: by,
                isbn,
            } => books.push(Suggestion {
                category: SuggestionCategory::Book,
                title,
                subtitle: by,
                action: SuggestionAction::OpenBook { isbn },
            }),
            RawSuggestion::Author { name, book_count } => authors.push(Suggestion {
                category: SuggestionCategory::Author,
                title: name.clone(),
                subtitle: count_label(book_count),
                action: SuggestionAction::FilterByAuthor { name },
            }),
            RawSuggestion::Category { name, book_count } => categories.push(Suggestion {
                category: SuggestionCategory::Category,
                title: name.clone(),
                subtitle: count_label(book_count),
                action: SuggestionAction::FilterByCategory { name },
            }),
        }
    }
    let mut merged = books;
    merged.append(&mut authors);
    merged.append(&mut categories);
    merged.extend(response.ai_suggestions.into_iter().map(hint_row));
    merged
}
