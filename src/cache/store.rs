//! Key-value store boundary and an in-memory implementation

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

/// String key-value store with per-entry time-to-live
///
/// Implementations report their own failures; the cache layer on top of
/// them treats any error as absence.
pub trait CacheStore: Send + Sync {
    /// Returns the stored value, or `None` if missing or expired
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, replacing any existing entry
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Local>,
}

/// Process-local store backed by a `HashMap`
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store that judges expiry by `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("lock poisoned: {}", e)))?;

        let now = self.clock.now();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {}", e)))?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("lock poisoned: {}", e)))?;

        let now = self.clock.now();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
