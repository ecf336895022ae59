//! Cache module for storing API responses
//!
//! Responses are cached under a digest of their request URL for a fixed
//! TTL. The [`CacheStore`] trait is the boundary to whatever key-value
//! service the host provides; [`MemoryStore`] and [`FileStore`] are the
//! bundled implementations. [`ResponseCache`] sits on top and swallows
//! every store failure, so a broken cache only ever costs a network call.

mod layer;
mod manager;
mod store;

pub use layer::{cache_key, ResponseCache, MAX_KEY_LEN};
pub use manager::FileStore;
pub use store::{CacheStore, MemoryStore};
