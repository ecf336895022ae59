//! Error types for the fallible boundaries of the client
//!
//! The retrying fetcher itself reports failures as values (see
//! [`crate::fetch::FetchFailure`]); the enums here cover cache stores,
//! configuration, and the Scorecard caller layer.

use thiserror::Error;

use crate::fetch::FetchFailure;

/// Errors raised by a [`crate::cache::CacheStore`] implementation
///
/// These never reach callers of the fetcher: the cache layer treats every
/// one of them as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be reached or its lock was poisoned
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a cache file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors found while validating an [`crate::config::ApiConfig`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("per_page must be at least 1")]
    ZeroPerPage,

    #[error("retry_attempts must be at least 1")]
    ZeroRetryAttempts,

    #[error("retry_delay_base_ms ({base}) exceeds retry_delay_max_ms ({max})")]
    BackoffBaseExceedsMax { base: u64, max: u64 },
}

/// Errors returned by [`crate::scorecard::ScorecardClient`]
#[derive(Debug, Error)]
pub enum ScorecardError {
    /// No API key was supplied
    #[error("College Scorecard API key is missing; get a free key at https://api.data.gov/signup/")]
    MissingApiKey,

    /// The supplied key is a placeholder or too short to be real
    #[error("College Scorecard API key looks like a placeholder; replace it with your own key")]
    InvalidApiKey,

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fetch failed before any lookup strategy could run
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// Every lookup strategy came back empty
    #[error("no match for {name:?} ({notes})")]
    NoMatch { name: String, notes: String },
}
