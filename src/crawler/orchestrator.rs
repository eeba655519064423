//! Crawl orchestration - lifecycle of one run
//!
//! The [`Orchestrator`] validates the configuration, prepares the output
//! directory and the shared [`CrawlContext`], runs the worker pool and turns
//! the way the run ended into a [`CrawlPhase`] and a [`CrawlReport`].

use crate::config::{compute_config_hash, validate, Config};
use crate::crawler::context::{CrawlContext, PageBudget, PendingWrites};
use crate::crawler::coordinator::FetchCoordinator;
use crate::crawler::fetcher::{FetchOptions, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::rate_controller::RateController;
use crate::crawler::retry::RetryPolicy;
use crate::output::{CrawlStatistics, StatsSnapshot};
use crate::state::CrawlPhase;
use crate::storage::{
    ConfigSnapshot, CrawlMetadata, MetadataStore, PageStore, SiteStore, SiteTree,
    METADATA_FILE_NAME,
};
use crate::transform::ContentTransformer;
use crate::url::{is_crawlable, CanonicalUrl, Canonicalizer, SiteScope};
use crate::{ConfigError, ScribeError};
use chrono::Utc;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What a run is about to do, passed to [`CrawlHooks::pre_crawl`]
#[derive(Debug, Clone)]
pub struct CrawlStart {
    pub seed: CanonicalUrl,
    pub domain_dir: PathBuf,
    pub config_hash: String,
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub phase: CrawlPhase,
    pub metadata: CrawlMetadata,
    pub stats: StatsSnapshot,
    /// Directory holding the seed domain's pages and metadata.json
    pub domain_dir: PathBuf,
    pub elapsed: Duration,
}

/// Callbacks around a run
///
/// Both run synchronously on the orchestrating task: `pre_crawl` after
/// preparation and before any worker starts, `post_crawl` after the final
/// metadata write.
pub trait CrawlHooks: Send + Sync {
    fn pre_crawl(&self, _start: &CrawlStart) {}

    fn post_crawl(&self, _report: &CrawlReport) {}
}

/// Hooks that log the start and end of a run
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl CrawlHooks for LoggingHooks {
    fn pre_crawl(&self, start: &CrawlStart) {
        tracing::info!(
            "Crawling {} into {} (config {})",
            start.seed,
            start.domain_dir.display(),
            start.config_hash
        );
    }

    fn post_crawl(&self, report: &CrawlReport) {
        tracing::info!(
            "Crawl {}: {} pages, max depth {}, {:.1}s",
            report.phase,
            report.metadata.pages_crawled,
            report.metadata.max_depth_reached,
            report.elapsed.as_secs_f64()
        );
    }
}

/// Cloneable remote control for a run
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    cancel: CancellationToken,
    budget: Arc<PageBudget>,
}

impl CrawlHandle {
    /// Requests cancellation; in-flight pages get the grace period to finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn pages_saved(&self) -> usize {
        self.budget.saved()
    }
}

/// Drives one crawl from seed to terminal phase
pub struct Orchestrator {
    config: Config,
    fetcher: Arc<dyn PageFetcher>,
    page_store: Option<Arc<dyn PageStore>>,
    hooks: Vec<Box<dyn CrawlHooks>>,
    phase: Mutex<CrawlPhase>,
    cancel: CancellationToken,
    budget: Arc<PageBudget>,
    stats: Arc<CrawlStatistics>,
}

impl Orchestrator {
    pub fn new(config: Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        let budget = Arc::new(PageBudget::new(config.crawler.max_pages));
        Self {
            config,
            fetcher,
            page_store: None,
            hooks: Vec::new(),
            phase: Mutex::new(CrawlPhase::Idle),
            cancel: CancellationToken::new(),
            budget,
            stats: Arc::new(CrawlStatistics::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: impl CrawlHooks + 'static) -> Self {
        self.hooks.push(Box::new(hooks));
        self
    }

    /// Replaces the default markdown [`SiteStore`]
    pub fn with_page_store(mut self, store: Arc<dyn PageStore>) -> Self {
        self.page_store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> CrawlPhase {
        *self.phase.lock()
    }

    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle {
            cancel: self.cancel.clone(),
            budget: Arc::clone(&self.budget),
        }
    }

    /// Runs the crawl to completion, cancellation or failure
    ///
    /// Precondition failures (bad config, bad seed, unusable output
    /// directory) leave the run `Failed` and are returned as errors before
    /// anything is written. A worker panic ends the run `Failed` but still
    /// returns a report. A second call returns `InvalidTransition`.
    pub async fn run(&self) -> Result<CrawlReport, ScribeError> {
        self.transition(CrawlPhase::Running)?;
        let started = Instant::now();

        let (ctx, start) = match self.prepare(started) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!("Crawl cannot start: {}", e);
                self.transition(CrawlPhase::Failed)?;
                return Err(e);
            }
        };

        for hook in &self.hooks {
            hook.pre_crawl(&start);
        }

        tracing::info!(
            "Starting crawl of {} with {} workers (depth {}, max {} pages)",
            start.seed,
            self.config.crawler.concurrency,
            self.config.crawler.max_depth,
            self.config.crawler.max_pages
        );

        let mut workers = JoinSet::new();
        FetchCoordinator::new(Arc::clone(&ctx), self.config.crawler.concurrency)
            .spawn(&mut workers);

        let mut panicked = false;
        let drained = tokio::select! {
            _ = drain(&mut workers, &ctx.frontier, &mut panicked) => true,
            _ = self.cancel.cancelled() => false,
        };

        if !drained {
            let abandoned = ctx.frontier.close();
            let grace = self.config.crawler.grace_period();
            tracing::info!(
                "Cancellation requested: {} queued pages abandoned, waiting up to {:?} for in-flight pages",
                abandoned,
                grace
            );

            let finished =
                tokio::time::timeout(grace, drain(&mut workers, &ctx.frontier, &mut panicked))
                    .await;
            if finished.is_err() {
                tracing::warn!("Grace period elapsed; aborting in-flight pages");
                workers.abort_all();
                drain(&mut workers, &ctx.frontier, &mut panicked).await;
            }
        }

        // Aborted workers may leave page writes running
        if ctx.writes.active() > 0 {
            tracing::debug!("Waiting for {} page writes", ctx.writes.active());
        }
        ctx.writes.wait_idle().await;

        let phase = if panicked {
            CrawlPhase::Failed
        } else if self.cancel.is_cancelled() {
            CrawlPhase::Cancelled
        } else {
            CrawlPhase::Completed
        };

        if let Err(e) = ctx.metadata.finalize(phase, Utc::now()) {
            tracing::error!("Failed to write final metadata: {}", e);
        }
        self.transition(phase)?;

        let report = CrawlReport {
            phase,
            metadata: ctx.metadata.snapshot(),
            stats: self.stats.snapshot(),
            domain_dir: start.domain_dir,
            elapsed: started.elapsed(),
        };

        for hook in &self.hooks {
            hook.post_crawl(&report);
        }

        Ok(report)
    }

    /// Everything that must succeed before a worker starts
    fn prepare(&self, started: Instant) -> Result<(Arc<CrawlContext>, CrawlStart), ScribeError> {
        let config = &self.config;
        validate(config)?;

        let canonicalizer = Canonicalizer::new(config.crawler.query_policy);
        let raw_seed = config
            .seed_url
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidUrl("no seed URL given".to_string()))?;
        let seed = canonicalizer.canonicalize(raw_seed)?;
        if !is_crawlable(&seed) {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' does not point to a page",
                seed
            ))
            .into());
        }

        let output_dir = &config.output.output_dir;
        std::fs::create_dir_all(output_dir).map_err(|source| ConfigError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        let tree = SiteTree::new(output_dir);
        let domain_dir = tree.domain_dir(&seed);
        let config_hash = compute_config_hash(config);

        let metadata = MetadataStore::new(
            domain_dir.join(METADATA_FILE_NAME),
            CrawlMetadata::new(
                seed.host_key(),
                seed.as_str(),
                Utc::now(),
                ConfigSnapshot::from_config(config, config_hash.clone()),
            ),
            config.output.metadata_flush_interval,
        );

        let scope = SiteScope::for_seed(&seed);
        let frontier = Frontier::new(
            canonicalizer,
            scope.clone(),
            config.crawler.max_depth,
            config.crawler.follow_external,
        );
        let admission = frontier.admit_canonical(seed.clone(), 0, None);
        if !admission.is_admitted() {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' was not admitted: {:?}",
                seed, admission
            ))
            .into());
        }

        // First write; failure here means the output tree is unusable
        metadata.flush()?;

        let store: Arc<dyn PageStore> = match &self.page_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(SiteStore::new(
                output_dir.clone(),
                config.crawler.include_assets,
            )),
        };

        let ctx = CrawlContext {
            frontier,
            rate: RateController::from_config(&config.politeness),
            fetcher: Arc::clone(&self.fetcher),
            fetch_options: FetchOptions {
                user_agent: config.crawler.user_agent.clone(),
                timeout: config.crawler.request_timeout(),
            },
            retry: RetryPolicy::new(config.crawler.max_retries, config.crawler.retry_backoff()),
            transformer: ContentTransformer::new(
                canonicalizer,
                scope,
                config.crawler.include_assets,
            ),
            store,
            metadata,
            budget: Arc::clone(&self.budget),
            stats: Arc::clone(&self.stats),
            writes: Arc::new(PendingWrites::new()),
            cancel: self.cancel.clone(),
            started,
        };

        let start = CrawlStart {
            seed,
            domain_dir,
            config_hash,
        };
        Ok((Arc::new(ctx), start))
    }

    fn transition(&self, next: CrawlPhase) -> Result<(), ScribeError> {
        let mut phase = self.phase.lock();
        *phase = phase.transition(next)?;
        tracing::debug!("Crawl phase: {}", *phase);
        Ok(())
    }
}

/// Waits for every worker to stop
///
/// A panicking worker never completes its entry, so the frontier is closed
/// to let the others finish.
async fn drain(workers: &mut JoinSet<()>, frontier: &Frontier, panicked: &mut bool) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!("Worker panicked: {}", e);
                *panicked = true;
                frontier.close();
            }
        }
    }
}
