//! TTL cache for tool execution results.
//!
//! Keys are the MD5 of the tool name plus the canonical JSON of its
//! arguments (serde_json orders object keys, so logically equal argument
//! maps hash identically). A secondary name-to-keys index makes per-tool
//! invalidation exact.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Statistics for cache performance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries currently stored
    pub entries: usize,
    /// Entries removed by expiry, invalidation, or clearing
    pub evictions: u64,
}

impl CacheStats {
    /// Total number of cache requests.
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Cache hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests() == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total_requests() as f64 * 100.0
    }
}

struct CacheEntry {
    value: Value,
    tool_name: String,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// tool name -> keys currently stored for it
    index: HashMap<String, HashSet<String>>,
    stats: CacheStats,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> bool {
        if let Some(entry) = self.entries.remove(key) {
            if let Some(keys) = self.index.get_mut(&entry.tool_name) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(&entry.tool_name);
                }
            }
            self.stats.evictions += 1;
            true
        } else {
            false
        }
    }
}

/// Thread-safe TTL map from (tool name, arguments) to cached results.
pub struct ToolCache {
    inner: Mutex<CacheInner>,
    default_ttl: Duration,
}

impl ToolCache {
    /// Create a cache with the given default time-to-live.
    pub fn new(default_ttl: Duration) -> Self {
        ToolCache {
            inner: Mutex::new(CacheInner::default()),
            default_ttl,
        }
    }

    fn key(tool_name: &str, args: &Value) -> String {
        let canonical = serde_json::to_string(args).unwrap_or_default();
        format!("{:x}", md5::compute(format!("{}:{}", tool_name, canonical)))
    }

    /// Look up a cached result. Expired entries are removed on access.
    pub fn get(&self, tool_name: &str, args: &Value) -> Option<Value> {
        let key = Self::key(tool_name, args);
        let mut inner = self.inner.lock();

        let live = match inner.entries.get(&key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                inner.stats.misses += 1;
                inner.stats.entries = inner.entries.len();
                return None;
            }
        };

        match live {
            Some(value) => {
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.remove(&key);
                inner.stats.misses += 1;
                inner.stats.entries = inner.entries.len();
                None
            }
        }
    }

    /// Store a result with an explicit TTL or the configured default.
    pub fn set(&self, tool_name: &str, args: &Value, value: Value, ttl: Option<Duration>) {
        let key = Self::key(tool_name, args);
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                tool_name: tool_name.to_string(),
                expires_at: Instant::now() + ttl.unwrap_or(self.default_ttl),
            },
        );
        inner
            .index
            .entry(tool_name.to_string())
            .or_default()
            .insert(key);
        inner.stats.entries = inner.entries.len();
    }

    /// Remove one entry (when `args` is given) or every entry stored for the
    /// tool. Returns the number of entries removed.
    pub fn invalidate(&self, tool_name: &str, args: Option<&Value>) -> usize {
        let mut inner = self.inner.lock();
        let removed = match args {
            Some(args) => {
                let key = Self::key(tool_name, args);
                usize::from(inner.remove(&key))
            }
            None => {
                let keys: Vec<String> = inner
                    .index
                    .get(tool_name)
                    .map(|keys| keys.iter().cloned().collect())
                    .unwrap_or_default();
                let mut count = 0;
                for key in keys {
                    if inner.remove(&key) {
                        count += 1;
                    }
                }
                count
            }
        };
        inner.stats.entries = inner.entries.len();
        removed
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = 0;
        for key in expired {
            if inner.remove(&key) {
                removed += 1;
            }
        }
        inner.stats.entries = inner.entries.len();
        removed
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let evicted = inner.entries.len() as u64;
        inner.entries.clear();
        inner.index.clear();
        inner.stats.evictions += evicted;
        inner.stats.entries = 0;
    }

    /// Coherent snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
