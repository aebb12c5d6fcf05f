//! Small utility helpers shared across the channel and search subsystems.
//!
//! The functions in this module are intentionally lightweight and
//! dependency-free so both subsystems can use them on hot paths.

/// What: Normalize raw search input into a stable cache key.
///
/// Inputs:
/// - `text`: Raw query text as typed by the user.
///
/// Output:
/// - Returns a trimmed, lowercased string with internal whitespace runs
///   collapsed to single spaces.
///
/// Details:
/// - `"  Harry   Potter "` and `"harry potter"` map to the same key, so the
///   suggestion cache treats them as one query.
/// - Operates on Unicode whitespace as defined by `char::is_whitespace`.
#[must_use]
pub fn normalize_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

/// What: Count the characters of a query after trimming surrounding whitespace.
///
/// Inputs:
/// - `text`: Raw query text.
///
/// Output:
/// - Number of `char`s remaining once leading/trailing whitespace is removed.
///
/// Details:
/// - Used for the minimum-length gate so `" a "` counts as one character,
///   matching what the user perceives as typed input.
#[must_use]
pub fn trimmed_len(text: &str) -> usize {
    text.trim().chars().count()
}
