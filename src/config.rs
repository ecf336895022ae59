//! Client configuration
//!
//! All options carry defaults matching the public College Scorecard API's
//! documented limits, so `ApiConfig::default()` is ready to use. Hosts that
//! keep settings elsewhere can deserialize the struct; missing fields fall
//! back to their defaults.

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Base URL for the College Scorecard schools endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.data.gov/ed/collegescorecard/v1/schools";

/// Options recognized by the fetcher and the Scorecard client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Endpoint every request is sent to
    pub base_url: String,
    /// Page size for search requests
    pub per_page: u32,
    /// Attempts per fetch when the caller doesn't override it
    pub retry_attempts: u32,
    /// First backoff delay in milliseconds
    pub retry_delay_base_ms: u64,
    /// Upper bound on any single backoff delay in milliseconds
    pub retry_delay_max_ms: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// How long successful responses stay cached, in seconds
    pub cache_duration_secs: u64,
    /// Network calls allowed per calendar day
    pub daily_quota_limit: u32,
    /// Wall-clock budget for one execution, in milliseconds
    pub execution_time_limit_ms: u64,
    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            per_page: 25,
            retry_attempts: 3,
            retry_delay_base_ms: 300,
            retry_delay_max_ms: 10_000,
            request_timeout_ms: 30_000,
            cache_duration_secs: 600,
            daily_quota_limit: 1000,
            execution_time_limit_ms: 300_000,
            user_agent: format!("CollegeTools/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    pub fn retry_delay_base(&self) -> Duration {
        Duration::from_millis(self.retry_delay_base_ms)
    }

    pub fn retry_delay_max(&self) -> Duration {
        Duration::from_millis(self.retry_delay_max_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }

    pub fn execution_time_limit(&self) -> Duration {
        Duration::from_millis(self.execution_time_limit_ms)
    }

    /// Checks the options for values the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }
        if self.per_page == 0 {
            return Err(ConfigError::ZeroPerPage);
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.retry_delay_base_ms > self.retry_delay_max_ms {
            return Err(ConfigError::BackoffBaseExceedsMax {
                base: self.retry_delay_base_ms,
                max: self.retry_delay_max_ms,
            });
        }
        Ok(())
    }
}
