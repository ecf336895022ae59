//! Retrying fetcher: cache, quota gate, retry loop, backoff
//!
//! [`Fetcher::fetch`] is the entry point callers use. One call moves
//! through these states, all `Done` states being terminal:
//!
//! ```text
//! CacheCheck -> Done(hit) | QuotaCheck
//! QuotaCheck -> Done(rejected) | Attempting
//! Attempting -> Done(success) | Done(parse error) | Done(non-retryable) | BackoffWait
//! BackoffWait -> Attempting
//! ```
//!
//! Every path ends in a [`FetchResult`]; nothing panics and nothing is
//! raised past the caller.

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::cache::{cache_key, CacheStore, MemoryStore, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::ApiConfig;
use crate::http::{HttpExecutor, HttpResponse, ReqwestExecutor};
use crate::quota::{QuotaRejection, QuotaTracker};

/// Successful outcome of a fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Parsed response body
    pub payload: Value,
    /// Whether the payload came from the cache instead of the network
    pub served_from_cache: bool,
}

/// Category of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Daily call limit reached before any attempt
    QuotaExceeded,
    /// Execution time budget used up
    TimeLimitExceeded,
    /// No response was received (status 0)
    TransportError,
    /// A status that retrying won't fix
    HttpError(u16),
    /// Status 200 with a body that isn't JSON
    ParseError,
    /// A retryable status persisted through every attempt
    RetriesExhausted,
}

impl FailureReason {
    /// Whether this failure came from the quota gate rather than the network
    pub fn is_quota_limit(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::TimeLimitExceeded)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "quota exceeded"),
            Self::TimeLimitExceeded => write!(f, "execution time limit exceeded"),
            Self::TransportError => write!(f, "transport error"),
            Self::HttpError(status) => write!(f, "HTTP {}", status),
            Self::ParseError => write!(f, "parse error"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// Failed outcome of a fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {detail}")]
pub struct FetchFailure {
    pub reason: FailureReason,
    pub detail: String,
    /// Status of the last attempt, if any attempt got a response
    pub last_status: Option<u16>,
}

impl FetchFailure {
    fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            last_status: None,
        }
    }

    fn with_status(mut self, status: u16) -> Self {
        self.last_status = Some(status);
        self
    }

    /// HTTP status of the last attempt, if one was received
    pub fn status(&self) -> Option<u16> {
        match self.reason {
            FailureReason::HttpError(status) => Some(status),
            _ => self.last_status,
        }
    }
}

impl From<QuotaRejection> for FetchFailure {
    fn from(rejection: QuotaRejection) -> Self {
        match rejection {
            QuotaRejection::DailyLimit => Self::new(
                FailureReason::QuotaExceeded,
                "API quota limit reached for today",
            ),
            QuotaRejection::ExecutionTime => Self::new(
                FailureReason::TimeLimitExceeded,
                "execution time limit approaching",
            ),
        }
    }
}

/// Outcome of one logical fetch
pub type FetchResult = Result<Fetched, FetchFailure>;

/// Per-call options for [`Fetcher::fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Look up and store the response in the cache
    pub use_cache: bool,
    /// Attempts to make; `None` uses the configured `retry_attempts`
    pub max_retries: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_retries: None,
        }
    }
}

impl FetchOptions {
    /// Options that skip the cache entirely
    pub fn no_cache() -> Self {
        Self {
            use_cache: false,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Whether a status is worth another attempt
pub fn is_retryable(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Waits out a backoff delay
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Replaces the `api_key` query value so URLs are safe to log
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return "<invalid url>".to_string();
    };
    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

/// Fetches JSON with caching, quota enforcement, and exponential backoff
///
/// Owns its quota state, so separate fetchers never share a budget.
pub struct Fetcher<E: HttpExecutor, Z: Sleeper = TokioSleeper> {
    executor: E,
    sleeper: Z,
    cache: Option<ResponseCache>,
    quota: QuotaTracker,
    backoff: BackoffPolicy,
    config: ApiConfig,
}

impl Fetcher<ReqwestExecutor> {
    /// Creates a fetcher that talks to the network through `reqwest`
    pub fn from_config(config: ApiConfig) -> Result<Self, reqwest::Error> {
        let executor = ReqwestExecutor::new(&config)?;
        Ok(Self::new(config, executor))
    }
}

impl<E: HttpExecutor> Fetcher<E> {
    /// Creates a fetcher with an in-memory cache, the system clock, and
    /// tokio sleeps
    pub fn new(config: ApiConfig, executor: E) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), config.cache_duration());
        Self {
            executor,
            sleeper: TokioSleeper,
            cache: Some(cache),
            quota: QuotaTracker::from_config(&config, clock),
            backoff: BackoffPolicy::from_config(&config),
            config,
        }
    }
}

impl<E: HttpExecutor, Z: Sleeper> Fetcher<E, Z> {
    /// Uses `store` for response caching
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(ResponseCache::new(store, self.config.cache_duration()));
        self
    }

    /// Disables caching regardless of per-call options
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Uses `clock` for quota tracking; resets quota state
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.quota = QuotaTracker::from_config(&self.config, clock);
        self
    }

    /// Uses `sleeper` for backoff waits
    pub fn with_sleeper<S: Sleeper>(self, sleeper: S) -> Fetcher<E, S> {
        Fetcher {
            executor: self.executor,
            sleeper,
            cache: self.cache,
            quota: self.quota,
            backoff: self.backoff,
            config: self.config,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Fetches `url` and parses the body as JSON
    ///
    /// # Behavior
    /// - A cache hit returns immediately without touching the quota
    /// - Otherwise the quota gate runs once; a rejection is final
    /// - Each attempt counts against the daily quota, whatever its outcome
    /// - Status 429 and 5xx are retried after a backoff delay; any other
    ///   failure, including transport errors, ends the fetch at once
    /// - The execution-time gate runs again before every retry
    /// - A 200 with an unparsable body is a `ParseError` and is not retried
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> FetchResult {
        let max_attempts = options
            .max_retries
            .unwrap_or(self.config.retry_attempts)
            .max(1);
        let cache = self.cache.as_ref().filter(|_| options.use_cache);
        let key = cache.map(|_| cache_key(url));

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(payload) = cache.get(key) {
                debug!(%key, "cache hit");
                return Ok(Fetched {
                    payload,
                    served_from_cache: true,
                });
            }
            debug!(%key, "cache miss");
        }

        self.quota.check()?;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                self.quota.check_time()?;
            }

            let response = self.executor.execute(url).await;
            self.quota.increment();
            debug!(
                url = %redact_url(url),
                attempt,
                status = response.status,
                "attempt finished"
            );

            if response.success {
                let body = response.body.as_deref().unwrap_or_default();
                let payload: Value = serde_json::from_str(body).map_err(|e| {
                    FetchFailure::new(
                        FailureReason::ParseError,
                        format!("Failed to parse JSON response: {}", e),
                    )
                    .with_status(response.status)
                })?;

                if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
                    cache.put(key, &payload);
                }
                return Ok(Fetched {
                    payload,
                    served_from_cache: false,
                });
            }

            if !is_retryable(response.status) {
                return Err(non_retryable_failure(&response));
            }

            if attempt + 1 >= max_attempts {
                warn!(
                    url = %redact_url(url),
                    attempts = max_attempts,
                    status = response.status,
                    "retries exhausted"
                );
                return Err(FetchFailure::new(
                    FailureReason::RetriesExhausted,
                    format!(
                        "HTTP {} after {} attempts{}",
                        response.status,
                        max_attempts,
                        error_suffix(&response)
                    ),
                )
                .with_status(response.status));
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            debug!(
                attempt,
                status = response.status,
                delay_ms = delay.as_millis() as u64,
                "retryable status, backing off"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

fn error_suffix(response: &HttpResponse) -> String {
    response
        .error
        .as_deref()
        .map(|e| format!(": {}", e))
        .unwrap_or_default()
}

fn non_retryable_failure(response: &HttpResponse) -> FetchFailure {
    if response.is_transport_error() {
        FetchFailure::new(
            FailureReason::TransportError,
            format!("HTTP 0{}", error_suffix(response)),
        )
        .with_status(0)
    } else {
        FetchFailure::new(
            FailureReason::HttpError(response.status),
            format!("HTTP {}", response.status),
        )
        .with_status(response.status)
    }
}
