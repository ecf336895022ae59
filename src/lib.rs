//! Resilient client for the College Scorecard API
//!
//! The core is [`Fetcher`], which wraps one REST endpoint with a response
//! cache, a daily quota and execution-time gate, and exponential backoff on
//! transient failures. [`ScorecardClient`] builds Scorecard queries on top
//! of it.
//!
//! ```no_run
//! use scorecard_client::{ApiConfig, Fetcher, ScorecardClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::from_config(ApiConfig::default())?;
//! let client = ScorecardClient::new(fetcher, "my-api-data-gov-key")?;
//! let outcome = client.search_colleges("Rice University", Some("TX")).await;
//! println!("{} results ({})", outcome.results.len(), outcome.notes_line());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod quota;
pub mod scorecard;

pub use backoff::BackoffPolicy;
pub use cache::{CacheStore, FileStore, MemoryStore, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ApiConfig;
pub use error::{CacheError, ConfigError, ScorecardError};
pub use fetch::{
    is_retryable, FailureReason, FetchFailure, FetchOptions, FetchResult, Fetched, Fetcher,
    Sleeper, TokioSleeper,
};
pub use http::{HttpExecutor, HttpResponse, ReqwestExecutor};
pub use quota::{QuotaRejection, QuotaState, QuotaStatus, QuotaTracker};
pub use scorecard::{CollegeMatch, Ownership, ScorecardClient, SearchOutcome};
