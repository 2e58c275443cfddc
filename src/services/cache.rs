use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt::Display,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::models::{RankedMovie, SimilarityMethod};

/// Cached value: a ranked result list shared with every reader
pub type CachedRanking = Arc<Vec<RankedMovie>>;

/// Query identity used for caching.
///
/// The `Display` form is the canonical encoding stored in the cache. It
/// includes the model version, so results never outlive the vocabulary they
/// were computed against.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    Similar {
        version: String,
        movie_id: u32,
        n: usize,
        method: SimilarityMethod,
    },
    Recommend {
        version: String,
        /// Known ratings only, ordered by movie id
        ratings: BTreeMap<u32, f64>,
        n: usize,
        min_rating: Option<f64>,
        method: SimilarityMethod,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Similar {
                version,
                movie_id,
                n,
                method,
            } => write!(f, "similar:{}:{}:{}:{}", version, method, movie_id, n),
            CacheKey::Recommend {
                version,
                ratings,
                n,
                min_rating,
                method,
            } => {
                write!(f, "recommend:{}:{}:{}:", version, method, n)?;
                match min_rating {
                    Some(min) => write!(f, "{}:", min)?,
                    None => write!(f, "-:")?,
                }
                for (idx, (movie_id, rating)) in ratings.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", movie_id, rating)?;
                }
                Ok(())
            }
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate as a fraction in `[0.0, 1.0]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, access-ordered cache of ranked query results
pub struct ResultCache {
    entries: Mutex<LruCache<String, CachedRanking>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a key, marking it most recently used on a hit
    pub fn get(&self, key: &CacheKey) -> Option<CachedRanking> {
        let found = self.entries.lock().get(key.to_string().as_str()).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Checks for a key without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains(key.to_string().as_str())
    }

    /// Inserts a value, returning the canonical key evicted to make room
    pub fn put(&self, key: &CacheKey, value: CachedRanking) -> Option<String> {
        let encoded = key.to_string();
        let displaced = self.entries.lock().push(encoded.clone(), value);

        match displaced {
            Some((old_key, _)) if old_key != encoded => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(evicted = %old_key, "Evicted least recently used result");
                Some(old_key)
            }
            _ => None,
        }
    }

    /// Removes a single entry
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key.to_string().as_str()).is_some()
    }

    /// Drops every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let (size, capacity) = {
            let entries = self.entries.lock();
            (entries.len(), entries.cap().get())
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            capacity,
        }
    }
}
