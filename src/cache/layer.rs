//! JSON response cache keyed by request URL

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::store::CacheStore;

/// Prefix shared by every response cache key
const KEY_PREFIX: &str = "scorecard_";

/// Longest key handed to a store; hosted key-value services cap key length
pub const MAX_KEY_LEN: usize = 200;

/// Derives the cache key for a fully-qualified request URL
///
/// The URL, query string included, is hashed with SHA-256 so the key is
/// stable across runs and independent of URL length.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let mut key = format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()));
    key.truncate(MAX_KEY_LEN);
    key
}

/// Read-through/write-through cache of parsed JSON responses
///
/// Lookups and writes never fail from the caller's point of view: a store
/// error, an unreadable entry, and a missing entry all look the same.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached payload for `key`, if any
    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%key, error = %e, "cached entry is not valid JSON, treating as miss");
                None
            }
        }
    }

    /// Stores `value` under `key` for the configured TTL
    pub fn put(&self, key: &str, value: &Value) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "could not serialize response for cache");
                return;
            }
        };

        if let Err(e) = self.store.put(key, &raw, self.ttl) {
            warn!(%key, error = %e, "cache write failed, continuing without caching");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::clock::ManualClock;
    use crate::error::CacheError;
    use chrono::{Local, TimeZone};
    use serde_json::json;

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("service down".to_string()))
        }

        fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("service down".to_string()))
        }
    }

    #[test]
    fn test_cache_key_is_deterministic_and_prefixed() {
        let url = "https://api.data.gov/ed/collegescorecard/v1/schools?school.name=MIT";

        let first = cache_key(url);
        let second = cache_key(url);

        assert_eq!(first, second);
        assert!(first.starts_with("scorecard_"));
        assert_eq!(first.len(), "scorecard_".len() + 64);
        assert!(first.len() <= MAX_KEY_LEN);
    }

    #[test]
    fn test_cache_key_depends_on_query_parameters() {
        let a = cache_key("https://example.com/schools?school.name=Yale");
        let b = cache_key("https://example.com/schools?school.name=Rice");

        assert_ne!(a, b);
    }

    #[test]
    fn test_put_then_get_round_trips_json() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), Duration::from_secs(600));

        cache.put("key", &json!({"a": 1}));

        assert_eq!(cache.get("key"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_get_is_absent_after_ttl() {
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let cache = ResponseCache::new(store, Duration::from_secs(600));

        cache.put("key", &json!({"a": 1}));
        clock.advance(chrono::Duration::seconds(600));

        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn test_store_failures_look_like_misses() {
        let cache = ResponseCache::new(Arc::new(BrokenStore), Duration::from_secs(600));

        cache.put("key", &json!({"a": 1}));

        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn test_unparsable_entry_looks_like_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("key", "<html>", Duration::from_secs(600))
            .expect("put should succeed");
        let cache = ResponseCache::new(store, Duration::from_secs(600));

        assert_eq!(cache.get("key"), None);
    }
}
