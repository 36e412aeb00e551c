//! A bounded cache in front of path normalization.
//!
//! Hot paths hit the router with identical raw strings over and over; the
//! cache keeps them from being re-parsed.  Results are cached whether
//! normalization succeeded or not, so repeated malformed paths stay cheap
//! too.  The cache is purely an optimization: lookups with and without it
//! return identical results.

use crate::{http::path::NormalizedPath, Error};
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default total capacity, in entries.
///
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

const SHARDS: usize = 8;

/// A sharded, least-recently-used map from raw path strings to
/// normalization results.
///
/// Entries are spread over a fixed number of independently locked LRU
/// shards keyed by the hash of the raw string, so concurrent lookups
/// rarely contend and recency is only approximate across shards.  A
/// capacity of `0` disables caching altogether.
///
pub struct PathCache {
    shards: Vec<Mutex<LruCache<String, Result<NormalizedPath, Error>>>>,
}

impl PathCache {
    /// A cache holding at most `capacity` entries in total.
    ///
    pub fn new(capacity: usize) -> Self {
        let per_shard = capacity.div_ceil(SHARDS);
        let shards = match NonZeroUsize::new(per_shard) {
            Some(per_shard) => (0..SHARDS)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            None => Vec::new(),
        };
        Self { shards }
    }

    /// Normalize `raw`, consulting and updating the cache.
    ///
    pub fn get_or_parse(&self, raw: &str) -> Result<NormalizedPath, Error> {
        if self.shards.is_empty() {
            return NormalizedPath::parse(raw);
        }
        let shard = &self.shards[self.shard_for(raw)];
        // A poisoned mutex only means another request panicked while
        // touching this shard; the cached data is still valid.
        let mut cache =
            shard.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(result) = cache.get(raw) {
            return result.clone();
        }
        let result = NormalizedPath::parse(raw);
        cache.put(raw.to_string(), result.clone());
        result
    }

    /// The number of currently cached entries, across all shards.
    ///
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .len()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, raw: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        hasher.finish() as usize % self.shards.len()
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
