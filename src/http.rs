//! Single HTTP GET with a bounded timeout
//!
//! [`HttpExecutor`] is the only place the client touches the network. It is
//! a total function: transport failures come back as a response value with
//! status 0 rather than as an error, so the retry loop can classify every
//! outcome the same way.

use reqwest::Client;
use std::future::Future;
use tracing::debug;

use crate::config::ApiConfig;

/// Outcome of one HTTP attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// `true` only for status 200
    pub success: bool,
    /// HTTP status, or 0 if no response was received
    pub status: u16,
    /// Response body, when one was read
    pub body: Option<String>,
    /// Transport failure description, when no response was received
    pub error: Option<String>,
}

impl HttpResponse {
    /// A response that arrived with `status`
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            success: status == 200,
            status,
            body: Some(body.into()),
            error: None,
        }
    }

    /// A request that never produced a response
    pub fn transport(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 0,
            body: None,
            error: Some(error.into()),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.status == 0
    }
}

/// Performs one GET request and never fails
///
/// # Implementations
///
/// - [`ReqwestExecutor`]: production implementation using `reqwest`
/// - scripted executors in tests
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, url: &str) -> impl Future<Output = HttpResponse> + Send;
}

/// Production executor backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    /// Builds a client with the configured timeout and `User-Agent`
    pub fn new(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, url: &str) -> HttpResponse {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, timeout = e.is_timeout(), "request failed before a response");
                return HttpResponse::transport(e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => HttpResponse::from_status(status, body),
            Err(e) => {
                debug!(status, error = %e, "failed to read response body");
                HttpResponse::transport(e.to_string())
            }
        }
    }
}
