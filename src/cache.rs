//! Query result memoization with TTL and LRU eviction.
//!
//! The cache is policy-agnostic: it enforces whatever TTL each entry was
//! given. Adaptive TTL selection lives in [`QueryKeyTracker`], which the
//! manager consults per query. Any mutation to the index invalidates the
//! whole cache before the mutating call returns, so no caller can observe
//! a stale hit after a mutation it can itself see.

use std::time::{Duration, Instant};

use ahash::{AHashMap, RandomState};

use crate::types::{SearchParams, SearchResults};

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: SearchResults,
    inserted_at: Instant,
    last_access: Instant,
    ttl: Duration,
}

/// Memoizes (query, k, params) → ranked results.
#[derive(Debug)]
pub struct ResultCache {
    entries: AHashMap<u64, CacheEntry>,
    capacity: usize,
    key_state: RandomState,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: AHashMap::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            key_state: RandomState::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Deterministic (within this process) key for a normalized query,
    /// result count, and search parameters.
    pub fn key_for(&self, query: &[f32], k: usize, params: &SearchParams) -> u64 {
        let mut bytes = Vec::with_capacity(query.len() * 4 + 24);
        for x in query {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        bytes.extend_from_slice(&(k as u64).to_le_bytes());
        match params.breadth {
            Some(b) => {
                bytes.push(1);
                bytes.extend_from_slice(&(b as u64).to_le_bytes());
            }
            None => bytes.push(0),
        }
        self.key_state.hash_one(&bytes)
    }

    /// Fetch a live entry, refreshing its last-access time. Expired
    /// entries are removed and counted as misses.
    pub fn get(&mut self, key: u64) -> Option<SearchResults> {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= entry.ttl => {
                entry.last_access = Instant::now();
                self.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(&key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a result with the given TTL, evicting the least recently
    /// used entry if the cache is full.
    pub fn put(&mut self, key: u64, value: SearchResults, ttl: Duration) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_access: now,
                ttl,
            },
        );
    }

    /// Drop every entry. Called by the manager after each mutation.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Current hit/miss statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Tracks how often query keys recur so the manager can hand frequently
/// repeated queries a longer TTL.
#[derive(Debug)]
pub struct QueryKeyTracker {
    counts: AHashMap<u64, u32>,
    base_ttl: Duration,
}

impl QueryKeyTracker {
    /// Bound on tracked keys before counts are discarded wholesale.
    const MAX_TRACKED: usize = 8192;

    /// Create a tracker with the given base TTL.
    pub fn new(base_ttl: Duration) -> Self {
        Self {
            counts: AHashMap::new(),
            base_ttl,
        }
    }

    /// Record an observation of `key` and return the TTL its cache entry
    /// should receive: 1x base for rare keys, 2x once repeated, 4x for
    /// hot keys.
    pub fn ttl_for(&mut self, key: u64) -> Duration {
        if self.counts.len() >= Self::MAX_TRACKED {
            self.counts.clear();
        }
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        match *count {
            0..=1 => self.base_ttl,
            2..=3 => self.base_ttl * 2,
            _ => self.base_ttl * 4,
        }
    }
}
