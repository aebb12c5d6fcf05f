//! Keystroke-level cache of merged suggestion lists.
//!
//! Keyed by the normalized query so case and whitespace variants of the
//! same text share one entry. Capacity-bounded LRU with an optional TTL;
//! with no TTL an entry stays valid until evicted.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::suggest::Suggestion;

struct CachedEntry {
    items: Vec<Suggestion>,
    cached_at: Instant,
}

/// LRU cache of merged suggestion rows per normalized query.
pub struct SuggestionCache {
    entries: LruCache<String, CachedEntry>,
    ttl: Option<Duration>,
}

impl SuggestionCache {
    /// Cache bounded to `capacity` queries; entries older than `ttl` are
    /// treated as absent.
    #[must_use]
    pub fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// Look up the rows for a normalized query, refreshing its LRU slot.
    /// Expired entries are dropped on access.
    pub fn get(&mut self, key: &str) -> Option<Vec<Suggestion>> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => match self.ttl {
                Some(ttl) => entry.cached_at.elapsed() >= ttl,
                None => false,
            },
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.items.clone())
    }

    /// Store the rows for a normalized query, evicting the least recently
    /// used entry when full.
    pub fn insert(&mut self, key: String, items: Vec<Suggestion>) {
        self.entries.put(
            key,
            CachedEntry {
                items,
                cached_at: Instant::now(),
            },
        );
    }

    /// Number of cached queries, expired entries included until touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
