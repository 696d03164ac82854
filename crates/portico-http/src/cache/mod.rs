//! Response caching with TTL support

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::api::{HttpMethod, HttpResponse, RequestBody};

/// Derive the cache key for a request.
///
/// Pure function of its inputs: query parameters are ordered by the
/// `BTreeMap`, and JSON bodies render with sorted object keys.
pub fn cache_key(
    method: HttpMethod,
    url: &str,
    query: &BTreeMap<String, String>,
    body: &RequestBody,
) -> String {
    let query = serde_json::to_string(query).unwrap_or_default();
    format!("{}:{}:{}:{}", method, url, query, body.fingerprint())
}

/// Cache entry with the instant it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached response
    pub payload: HttpResponse,
    /// When the entry was stored
    pub stored_at: Instant,
}

impl CacheEntry {
    pub fn new(payload: HttpResponse) -> Self {
        Self {
            payload,
            stored_at: Instant::now(),
        }
    }

    /// Check if cache entry is still fresh
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }

    /// Get age of cache entry
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

/// In-memory response cache with a fixed TTL
#[derive(Debug)]
pub struct RequestCache {
    /// Cache storage
    cache: DashMap<String, CacheEntry>,
    /// Time-to-live for every entry
    ttl: Duration,
}

impl RequestCache {
    /// Create new response cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get cached response if fresh; stale entries behave as absent
    pub fn get(&self, key: &str) -> Option<HttpResponse> {
        let fresh = {
            let entry = self.cache.get(key)?;
            entry.is_fresh(self.ttl).then(|| entry.payload.clone())
        };
        if fresh.is_none() {
            // Remove stale entry
            self.cache.remove_if(key, |_, entry| !entry.is_fresh(self.ttl));
        }
        fresh
    }

    /// Store a response
    pub fn set(&self, key: String, payload: HttpResponse) {
        self.cache.insert(key, CacheEntry::new(payload));
    }

    /// Check if key is cached and fresh
    pub fn contains_fresh(&self, key: &str) -> bool {
        self.cache
            .get(key)
            .map(|entry| entry.is_fresh(self.ttl))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut fresh_count = 0;
        let mut stale_count = 0;

        for entry in self.cache.iter() {
            if entry.is_fresh(self.ttl) {
                fresh_count += 1;
            } else {
                stale_count += 1;
            }
        }

        CacheStats {
            total_entries: fresh_count + stale_count,
            fresh_entries: fresh_count,
            stale_entries: stale_count,
        }
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Remove stale entries
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.cache.retain(|_, entry| {
            if entry.is_fresh(self.ttl) {
                true
            } else {
                removed += 1;
                false
            }
        });
        removed
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of fresh entries
    pub fresh_entries: usize,
    /// Number of stale entries
    pub stale_entries: usize,
}

#[cfg(test)]
mod tests;
