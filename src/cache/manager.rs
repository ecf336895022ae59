//! File-backed cache store
//!
//! Provides a `FileStore` that keeps each entry as a small JSON file with
//! an expiry timestamp, so cached API responses survive between runs.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use super::store::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

/// Wrapper struct for cached data stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// The cached value, already serialized by the caller
    value: String,
    /// When the value was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// Stores cache entries as JSON files in a directory
///
/// The default directory is XDG-compliant (`~/.cache/scorecard-client/` on
/// Linux). Expired entries read as absent and are left for the next write
/// of the same key to replace.
#[derive(Clone)]
pub struct FileStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Judges when entries were written and whether they have expired
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Creates a FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "scorecard-client")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self::with_dir(cache_dir))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for timestamps and expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{}.json", file_stem))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let content = match fs::read_to_string(self.cache_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_str(&content)?;

        if self.now() >= entry.expires_at {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn put(&self, key: &str, value: &str, ttl: std::time::Duration) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let ttl = Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {}", e)))?;
        let now = self.now();
        let entry = CacheEntry {
            value: value.to_string(),
            cached_at: now,
            expires_at: now + ttl,
        };

        let json = serde_json::to_string_pretty(&entry)?;
        fs::write(self.cache_path(key), json)?;
        Ok(())
    }
}
