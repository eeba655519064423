//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client
//! - GET requests with a per-request user agent and timeout
//! - Manual redirect handling (the client never follows redirects itself)
//! - Classifying responses and transport errors into [`FetchResult`]

use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// 2xx response with its body
    Success {
        /// Response body
        html: String,
        /// URL the body was served from
        final_url: Url,
        /// HTTP status code
        status: u16,
    },

    /// 3xx response; `target` is the absolute Location
    Redirect { target: String },

    /// 4xx response (or a 3xx without a usable Location)
    ClientError { status: u16 },

    /// 5xx response
    ServerError { status: u16 },

    /// Connection, TLS, body or other transport failure
    NetworkError { cause: String },

    /// Request did not finish within the timeout
    Timeout,
}

impl FetchResult {
    /// The failure as an error value, for logging
    pub fn error(&self) -> Option<FetchError> {
        match self {
            FetchResult::Success { .. } | FetchResult::Redirect { .. } => None,
            FetchResult::ClientError { status } => Some(FetchError::Client(*status)),
            FetchResult::ServerError { status } => Some(FetchError::Server(*status)),
            FetchResult::NetworkError { cause } => Some(FetchError::Network(cause.clone())),
            FetchResult::Timeout => Some(FetchError::Timeout),
        }
    }
}

/// Per-page fetch failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("client error: HTTP {0}")]
    Client(u16),

    #[error("server error: HTTP {0}")]
    Server(u16),
}

/// Per-request settings
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub timeout: Duration,
}

/// Source of pages
///
/// Cancellation is by dropping the returned future.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are not followed by the client; the crawler decides what to do
/// with each hop.
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. TLS backend init)
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageFetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL and classifies the outcome
    ///
    /// | Response | Result |
    /// |----------|--------|
    /// | 2xx | `Success` |
    /// | 3xx with Location | `Redirect` (Location resolved against `url`) |
    /// | 3xx without Location, 4xx | `ClientError` |
    /// | 5xx | `ServerError` |
    /// | timed out | `Timeout` |
    /// | anything else failing | `NetworkError` |
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> FetchResult {
        let response = match self
            .client
            .get(url.clone())
            .header(header::USER_AGENT, options.user_agent.as_str())
            .timeout(options.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();

        if status.is_redirection() {
            let target = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| url.join(location).ok());
            return match target {
                Some(target) => FetchResult::Redirect {
                    target: target.to_string(),
                },
                None => {
                    tracing::debug!("{} redirected without a usable Location", url);
                    FetchResult::ClientError {
                        status: status.as_u16(),
                    }
                }
            };
        }

        if status.is_client_error() {
            return FetchResult::ClientError {
                status: status.as_u16(),
            };
        }

        if status.is_server_error() {
            return FetchResult::ServerError {
                status: status.as_u16(),
            };
        }

        if !status.is_success() {
            // 1xx that reqwest surfaced as final
            return FetchResult::NetworkError {
                cause: format!("unexpected status {}", status),
            };
        }

        let final_url = response.url().clone();
        match response.text().await {
            Ok(html) => FetchResult::Success {
                html,
                final_url,
                status: status.as_u16(),
            },
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(error: &reqwest::Error) -> FetchResult {
    if error.is_timeout() {
        FetchResult::Timeout
    } else if error.is_connect() {
        FetchResult::NetworkError {
            cause: format!("connection failed: {}", error),
        }
    } else {
        FetchResult::NetworkError {
            cause: error.to_string(),
        }
    }
}
