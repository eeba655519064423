//! Fetch coordinator - the worker pool
//!
//! Each worker repeatedly takes one entry from the frontier and carries it
//! through politeness wait, fetch, retries, transformation, storage and link
//! admission. Workers stop when the frontier closes.

use crate::crawler::context::CrawlContext;
use crate::crawler::fetcher::FetchResult;
use crate::crawler::frontier::FrontierEntry;
use crate::output::CrawlStatistics;
use crate::storage::StorageResult;
use crate::transform::Document;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// Redirects to the entry's own canonical URL followed before giving up
pub const MAX_SELF_REDIRECTS: u32 = 5;

/// Saved pages between progress log lines
const PROGRESS_INTERVAL: usize = 10;

pub struct FetchCoordinator {
    ctx: Arc<CrawlContext>,
    workers: usize,
}

impl FetchCoordinator {
    pub fn new(ctx: Arc<CrawlContext>, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
        }
    }

    /// Starts the workers on `set`
    pub fn spawn(&self, set: &mut JoinSet<()>) {
        for id in 0..self.workers {
            let ctx = Arc::clone(&self.ctx);
            set.spawn(worker_loop(id, ctx));
        }
        tracing::debug!("Started {} workers", self.workers);
    }
}

async fn worker_loop(id: usize, ctx: Arc<CrawlContext>) {
    loop {
        let batch = ctx.frontier.dequeue_batch(1).await;
        if batch.is_empty() {
            break;
        }

        let taken = batch.len();
        for entry in batch {
            process_entry(&ctx, entry).await;
        }
        ctx.frontier.complete(taken);
    }
    tracing::trace!("Worker {} stopped", id);
}

/// Processes one frontier entry to its end
///
/// Failures are logged and counted here; nothing propagates to the caller.
async fn process_entry(ctx: &Arc<CrawlContext>, entry: FrontierEntry) {
    if ctx.cancel.is_cancelled() {
        return;
    }
    if ctx.budget.is_exhausted() {
        tracing::debug!("Page budget reached; skipping {}", entry.url);
        CrawlStatistics::incr(&ctx.stats.pages_dropped);
        return;
    }

    let mut request_url: Url = entry.url.as_url().clone();
    let mut attempt: u32 = 0;
    let mut self_redirects: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            _ = ctx.rate.await_turn(&entry.url) => {}
        }

        // Another worker may have saved the last page while this one waited
        if ctx.budget.is_exhausted() {
            tracing::debug!("Page budget reached; not fetching {}", entry.url);
            CrawlStatistics::incr(&ctx.stats.pages_dropped);
            return;
        }

        CrawlStatistics::incr(&ctx.stats.fetch_attempts);
        if attempt > 0 {
            CrawlStatistics::incr(&ctx.stats.retries);
        }
        tracing::debug!("Fetching {} (depth {}, attempt {})", request_url, entry.depth, attempt + 1);

        let result = ctx.fetcher.fetch(&request_url, &ctx.fetch_options).await;
        match result {
            FetchResult::Success { html, status, .. } => {
                CrawlStatistics::incr(&ctx.stats.successes);
                tracing::trace!("{} answered {}", request_url, status);
                save_page(ctx, entry, html).await;
                return;
            }

            FetchResult::Redirect { target } => {
                CrawlStatistics::incr(&ctx.stats.redirects);
                match ctx.frontier.canonicalizer().canonicalize(&target) {
                    Ok(canonical) if canonical == entry.url => {
                        self_redirects += 1;
                        if self_redirects > MAX_SELF_REDIRECTS {
                            tracing::warn!("Dropping {}: redirect loop", entry.url);
                            CrawlStatistics::incr(&ctx.stats.pages_dropped);
                            return;
                        }
                        match Url::parse(&target) {
                            Ok(next) => request_url = next,
                            Err(_) => return,
                        }
                    }
                    Ok(canonical) => {
                        let admission =
                            ctx.frontier
                                .admit_canonical(canonical, entry.depth, entry.parent.clone());
                        tracing::debug!(
                            "{} redirects to {} ({:?})",
                            entry.url,
                            target,
                            admission
                        );
                        if admission.is_admitted() {
                            CrawlStatistics::incr(&ctx.stats.links_admitted);
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("Dropping {}: bad redirect target {}: {}", entry.url, target, e);
                        CrawlStatistics::incr(&ctx.stats.pages_dropped);
                        return;
                    }
                }
            }

            FetchResult::ClientError { status } => {
                CrawlStatistics::incr(&ctx.stats.client_errors);
                tracing::warn!("Dropping {}: HTTP {}", entry.url, status);
                CrawlStatistics::incr(&ctx.stats.pages_dropped);
                return;
            }

            failure @ (FetchResult::ServerError { .. }
            | FetchResult::NetworkError { .. }
            | FetchResult::Timeout) => {
                count_failure(&ctx.stats, &failure);
                let reason = failure
                    .error()
                    .map(|e| e.to_string())
                    .unwrap_or_default();

                if ctx.cancel.is_cancelled() {
                    return;
                }
                if !ctx.retry.should_retry(attempt + 1) {
                    tracing::warn!(
                        "Dropping {} after {} attempts: {}",
                        entry.url,
                        attempt + 1,
                        reason
                    );
                    CrawlStatistics::incr(&ctx.stats.pages_dropped);
                    return;
                }

                let backoff = ctx.retry.backoff_for(attempt);
                tracing::debug!("Retrying {} in {:?}: {}", entry.url, backoff, reason);
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
        }
    }
}

fn count_failure(stats: &CrawlStatistics, failure: &FetchResult) {
    let counter = match failure {
        FetchResult::ServerError { .. } => &stats.server_errors,
        FetchResult::Timeout => &stats.timeouts,
        FetchResult::NetworkError { .. } => &stats.network_errors,
        FetchResult::Success { .. }
        | FetchResult::Redirect { .. }
        | FetchResult::ClientError { .. } => return,
    };
    CrawlStatistics::incr(counter);
}

/// Runs [`handle_page`] on the blocking pool
///
/// The write is tracked in [`CrawlContext::writes`]; once started it runs to
/// the end even if this task is aborted, so a saved file is always counted.
async fn save_page(ctx: &Arc<CrawlContext>, entry: FrontierEntry, html: String) {
    let guard = ctx.writes.enter();
    let worker_ctx = Arc::clone(ctx);
    let joined = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        handle_page(&worker_ctx, &entry, &html);
    })
    .await;

    if let Err(e) = joined {
        if e.is_panic() {
            std::panic::resume_unwind(e.into_panic());
        }
    }
}

/// Transforms, stores and expands a fetched page
fn handle_page(ctx: &CrawlContext, entry: &FrontierEntry, html: &str) {
    let document = ctx.transformer.transform(html, &entry.url);

    if !ctx.budget.try_reserve() {
        tracing::debug!("Page budget reached; discarding {}", entry.url);
        CrawlStatistics::incr(&ctx.stats.pages_dropped);
        ctx.frontier.close();
        return;
    }

    let path = match store_document(ctx, &document) {
        Ok(path) => path,
        Err(e) => {
            ctx.budget.release();
            tracing::warn!("Dropping {}: could not write page: {}", entry.url, e);
            CrawlStatistics::incr(&ctx.stats.pages_dropped);
            return;
        }
    };

    let saved = ctx.budget.commit();
    if let Err(e) = ctx.metadata.record_page(entry.depth) {
        tracing::warn!("Failed to update metadata: {}", e);
    }
    tracing::info!(
        "Saved {} -> {} ({}/{})",
        entry.url,
        path.display(),
        saved,
        ctx.budget.max()
    );

    if saved % PROGRESS_INTERVAL == 0 {
        let elapsed = ctx.started.elapsed();
        let rate = saved as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            "Progress: {} pages saved, {} in frontier, {:.2} pages/sec",
            saved,
            ctx.frontier.len(),
            rate
        );
    }

    CrawlStatistics::add(&ctx.stats.links_discovered, document.links().count() as u64);

    if ctx.budget.is_exhausted() {
        let abandoned = ctx.frontier.close();
        tracing::info!(
            "Page budget of {} reached; {} queued pages abandoned",
            ctx.budget.max(),
            abandoned
        );
        return;
    }

    let child_depth = entry.depth + 1;
    for link in document.links() {
        let admission =
            ctx.frontier
                .admit_canonical(link.clone(), child_depth, Some(entry.url.clone()));
        if admission.is_admitted() {
            CrawlStatistics::incr(&ctx.stats.links_admitted);
        } else {
            tracing::trace!("Not following {}: {:?}", link, admission);
        }
    }
}

/// Writes the page, retrying once
fn store_document(ctx: &CrawlContext, document: &Document) -> StorageResult<PathBuf> {
    match ctx.store.store(document) {
        Ok(path) => Ok(path),
        Err(first) => {
            CrawlStatistics::incr(&ctx.stats.storage_failures);
            tracing::debug!("Retrying write of {}: {}", document.source_url, first);
            ctx.store.store(document).map_err(|e| {
                CrawlStatistics::incr(&ctx.stats.storage_failures);
                e
            })
        }
    }
}
