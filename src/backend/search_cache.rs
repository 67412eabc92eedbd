//! Bounded search result cache
//!
//! Entries are evicted in insertion order once the cache grows past its
//! capacity. Lookups do not refresh an entry's position.
//!
//! Each entry remembers the result limit it was built under. A list that hit
//! its limit may be missing matches, so it only answers requests asking for
//! at most that many results.

use crate::backend::search::{SearchKind, SearchResult};
use std::collections::{HashMap, VecDeque};

/// Identity of a cached search
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub term: String,
    pub kind: SearchKind,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone)]
struct CachedResults {
    results: Vec<SearchResult>,
    /// `max_results` of the search that produced `results`
    limit: usize,
}

impl CachedResults {
    /// Whether these results equal a fresh search's first `max_results`
    fn covers(&self, kind: SearchKind, max_results: usize) -> bool {
        match kind {
            // The three-way split depends on the limit itself
            SearchKind::All => max_results == self.limit,
            _ => max_results <= self.limit || self.results.len() < self.limit,
        }
    }
}

/// FIFO-evicting result cache
#[derive(Debug, Clone)]
pub struct SearchCache {
    capacity: usize,
    entries: HashMap<CacheKey, CachedResults>,
    /// Keys oldest-inserted first
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl SearchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up the first `max_results` results for `key`, counting the hit
    /// or miss. An entry built under a smaller limit that may have been cut
    /// short counts as a miss.
    pub fn get(&mut self, key: &CacheKey, max_results: usize) -> Option<&[SearchResult]> {
        match self.entries.get(key) {
            Some(entry) if entry.covers(key.kind, max_results) => {
                self.hits += 1;
                let take = entry.results.len().min(max_results);
                Some(&entry.results[..take])
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a result list built under `limit`, evicting the oldest entries
    /// beyond capacity
    pub fn insert(&mut self, key: CacheKey, results: Vec<SearchResult>, limit: usize) {
        let entry = CachedResults { results, limit };
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(term: &str) -> CacheKey {
        CacheKey {
            term: term.to_string(),
            kind: SearchKind::Message,
            case_sensitive: false,
        }
    }

    fn node(name: &str) -> Vec<SearchResult> {
        nodes(name, 1)
    }

    fn nodes(name: &str, count: usize) -> Vec<SearchResult> {
        (0..count)
            .map(|i| SearchResult::Node {
                name: format!("{}{}", name, i),
                comment: None,
            })
            .collect()
    }

    #[test]
    fn test_evicts_oldest_inserted() {
        let mut cache = SearchCache::new(2);
        cache.insert(key("a"), node("a"), 100);
        cache.insert(key("b"), node("b"), 100);

        // Reading "a" does not protect it
        assert!(cache.get(&key("a"), 100).is_some());
        cache.insert(key("c"), node("c"), 100);

        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut cache = SearchCache::new(2);
        cache.insert(key("a"), node("a"), 100);
        cache.insert(key("b"), node("b"), 100);
        cache.insert(key("a"), node("a2"), 100);
        cache.insert(key("c"), node("c"), 100);

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_key_includes_kind_and_case() {
        let mut cache = SearchCache::new(4);
        cache.insert(key("a"), node("a"), 100);
        let other_kind = CacheKey {
            kind: SearchKind::Signal,
            ..key("a")
        };
        let case_sensitive = CacheKey {
            case_sensitive: true,
            ..key("a")
        };
        assert!(cache.get(&other_kind, 100).is_none());
        assert!(cache.get(&case_sensitive, 100).is_none());
        assert!(cache.get(&key("a"), 100).is_some());
        assert_eq!((cache.hits(), cache.misses()), (1, 2));
    }

    #[test]
    fn test_truncated_entry_does_not_serve_larger_limit() {
        let mut cache = SearchCache::new(4);
        // Built with max_results = 5 and cut off at 5
        cache.insert(key("f"), nodes("f", 5), 5);

        assert_eq!(cache.get(&key("f"), 3).map(<[_]>::len), Some(3));
        assert_eq!(cache.get(&key("f"), 5).map(<[_]>::len), Some(5));
        assert!(cache.get(&key("f"), 100).is_none());
        assert_eq!((cache.hits(), cache.misses()), (2, 1));

        // Rebuilt under the larger limit, the entry serves both
        cache.insert(key("f"), nodes("f", 30), 100);
        assert_eq!(cache.get(&key("f"), 100).map(<[_]>::len), Some(30));
        assert_eq!(cache.get(&key("f"), 5).map(<[_]>::len), Some(5));
    }

    #[test]
    fn test_complete_entry_serves_any_limit() {
        let mut cache = SearchCache::new(4);
        // Only 2 matches exist; the limit of 5 was never reached
        cache.insert(key("g"), nodes("g", 2), 5);
        assert_eq!(cache.get(&key("g"), 100).map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_combined_entry_needs_same_limit() {
        let mut cache = SearchCache::new(4);
        let all = CacheKey {
            kind: SearchKind::All,
            ..key("h")
        };
        cache.insert(all.clone(), nodes("h", 2), 7);
        assert!(cache.get(&all, 7).is_some());
        assert!(cache.get(&all, 6).is_none());
        assert!(cache.get(&all, 100).is_none());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_never_exceeds_capacity(
            capacity in 1usize..10,
            terms in prop::collection::vec("[a-e]{1,2}", 0..60)
        ) {
            let mut cache = SearchCache::new(capacity);
            for term in &terms {
                cache.insert(key(term), node(term), 100);
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.order.len(), cache.entries.len());
            }
        }
    }
}
