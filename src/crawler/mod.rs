//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - the frontier and its visited set
//! - per-host politeness delays
//! - HTTP fetching and the retry policy
//! - the worker pool and the run lifecycle

mod context;
mod coordinator;
mod fetcher;
mod frontier;
mod orchestrator;
mod rate_controller;
mod retry;

pub use context::{CrawlContext, PageBudget, PendingWrites, WriteGuard};
pub use coordinator::{FetchCoordinator, MAX_SELF_REDIRECTS};
pub use fetcher::{
    build_http_client, FetchError, FetchOptions, FetchResult, HttpFetcher, PageFetcher,
};
pub use frontier::{Admission, Frontier, FrontierEntry};
pub use orchestrator::{CrawlHandle, CrawlHooks, CrawlReport, CrawlStart, LoggingHooks, Orchestrator};
pub use rate_controller::RateController;
pub use retry::{RetryPolicy, MAX_BACKOFF};

use crate::config::Config;
use crate::ScribeError;
use std::sync::Arc;

/// Crawls with the default HTTP fetcher
///
/// This is the simplest entry point: it builds an [`HttpFetcher`], runs an
/// [`Orchestrator`] with [`LoggingHooks`] and returns the report.
///
/// # Arguments
///
/// * `config` - The crawler configuration, seed URL included
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran; see `phase` for how it ended
/// * `Err(ScribeError)` - The crawl could not start
pub async fn crawl(config: Config) -> Result<CrawlReport, ScribeError> {
    let fetcher = Arc::new(HttpFetcher::new()?);
    Orchestrator::new(config, fetcher)
        .with_hooks(LoggingHooks)
        .run()
        .await
}
