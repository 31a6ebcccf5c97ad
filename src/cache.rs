//! Response cache for ranked queries, backed by moka.
//!
//! Entries expire after a fixed TTL and the cache is bounded by entry count.
//! Cached values are cloned out, so a hit is identical to the live
//! computation it replaced.

use std::time::Duration;

use moka::sync::Cache;

use netref_core::rank::{RankMode, Scope};

/// Cache key: normalized query text plus everything that changes the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub query: String,
    pub mode: RankMode,
    pub scope: Scope,
    pub limit: usize,
}

impl QueryKey {
    pub fn new(query: &str, mode: RankMode, scope: Scope, limit: usize) -> Self {
        Self {
            query: normalize_query(query),
            mode,
            scope,
            limit,
        }
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ResponseCache<V> {
    cache: Cache<QueryKey, V>,
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries.max(1))
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &QueryKey) -> Option<V> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: QueryKey, value: V) {
        self.cache.insert(key, value);
    }

    /// Approximate entry count; eviction and expiry are applied lazily.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
