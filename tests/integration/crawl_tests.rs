//! End-to-end crawl tests against an in-memory site
//!
//! These run the full orchestrator (frontier, workers, transformer, storage
//! and metadata) with a [`MockFetcher`] standing in for the network.

use crate::support::{html_page, markdown_files, temp_files, test_config, MockFetcher, Route};
use parking_lot::Mutex;
use sitescribe::crawler::{CrawlHooks, CrawlReport, CrawlStart, Orchestrator};
use sitescribe::storage::{load_metadata, PageStore, SiteStore, StorageError, StorageResult};
use sitescribe::transform::Document;
use sitescribe::url::CanonicalUrl;
use sitescribe::{CrawlPhase, ConfigError, ScribeError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SEED: &str = "https://example.com/";

fn read(path: PathBuf) -> String {
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

#[tokio::test]
async fn test_small_site_is_mirrored() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/about", "/contact"]))
            .page("https://example.com/about", &html_page("About", &["/"]))
            .page("https://example.com/contact", &html_page("Contact", &[])),
    );

    let orchestrator = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone());
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(orchestrator.phase(), CrawlPhase::Completed);
    assert_eq!(report.metadata.pages_crawled, 3);
    assert_eq!(report.metadata.max_depth_reached, 1);

    let site = dir.path().join("example.com");
    assert_eq!(report.domain_dir, site);
    assert_eq!(
        markdown_files(&site),
        vec![
            site.join("about.md"),
            site.join("contact.md"),
            site.join("index.md")
        ]
    );

    let index = read(site.join("index.md"));
    assert!(index.starts_with("# Home\n"));
    assert!(index.contains("Source: https://example.com/\n"));
    assert!(index.contains("1. https://example.com/about\n2. https://example.com/contact\n"));

    let meta = load_metadata(&site.join("metadata.json")).unwrap().unwrap();
    assert_eq!(meta.domain, "example.com");
    assert_eq!(meta.start_url, SEED);
    assert_eq!(meta.pages_crawled, 3);
    assert_eq!(meta.max_depth_reached, 1);
    assert_eq!(meta.status, CrawlPhase::Completed);
    assert!(meta.finished_at.is_some());
    assert_eq!(meta.config.max_depth, 3);

    // Each page fetched exactly once; the link back to "/" is a duplicate
    assert_eq!(fetcher.calls().len(), 3);
    assert_eq!(fetcher.calls_to(SEED), 1);
    assert!(fetcher
        .user_agents()
        .iter()
        .all(|ua| ua == "sitescribe-test/1.0"));
}

#[tokio::test]
async fn test_external_links_listed_but_not_crawled() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/about", "https://other.org/page"]))
            .page("https://example.com/about", &html_page("About", &[]))
            .page("https://other.org/page", &html_page("Elsewhere", &[])),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(fetcher.calls_to("https://other.org/page"), 0);
    assert!(!dir.path().join("other.org").exists());

    let index = read(dir.path().join("example.com/index.md"));
    assert!(index.contains("### External\n\n1. https://other.org/page\n"));
}

#[tokio::test]
async fn test_follow_external_stores_under_own_domain() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["https://other.org/page"]))
            .page("https://other.org/page", &html_page("Elsewhere", &[])),
    );
    let mut config = test_config(SEED, dir.path());
    config.crawler.follow_external = true;

    let report = Orchestrator::new(config, fetcher).run().await.unwrap();

    assert_eq!(report.metadata.pages_crawled, 2);
    assert!(dir.path().join("other.org/page.md").exists());
    // Metadata lives with the seed domain only
    assert!(!dir.path().join("other.org/metadata.json").exists());
    assert!(dir.path().join("example.com/metadata.json").exists());
}

#[tokio::test]
async fn test_persistent_server_error_is_retried_then_dropped() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/broken", "/ok"]))
            .route("https://example.com/broken", Route::Status(503))
            .page("https://example.com/ok", &html_page("Ok", &[])),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    // max_retries = 3 caps the attempts at three
    assert_eq!(fetcher.calls_to("https://example.com/broken"), 3);
    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(report.stats.server_errors, 3);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.stats.pages_dropped, 1);
    assert!(!dir.path().join("example.com/broken.md").exists());
    assert!(dir.path().join("example.com/ok.md").exists());
}

#[tokio::test]
async fn test_timeouts_respect_max_retries() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/slow"]))
            .route("https://example.com/slow", Route::Timeout),
    );
    let mut config = test_config(SEED, dir.path());
    config.crawler.max_retries = 2;

    let report = Orchestrator::new(config, fetcher.clone()).run().await.unwrap();

    assert_eq!(fetcher.calls_to("https://example.com/slow"), 2);
    assert_eq!(report.stats.timeouts, 2);
    assert_eq!(report.metadata.pages_crawled, 1);
}

#[tokio::test]
async fn test_three_server_errors_drop_the_page() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/flaky"]))
            .route(
                "https://example.com/flaky",
                Route::Flaky {
                    failures: 3,
                    html: html_page("Flaky", &[]),
                },
            ),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.calls_to("https://example.com/flaky"), 3);
    assert_eq!(report.metadata.pages_crawled, 1);
    assert!(!dir.path().join("example.com/flaky.md").exists());
}

#[tokio::test]
async fn test_page_saved_when_last_attempt_succeeds() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/flaky"]))
            .route(
                "https://example.com/flaky",
                Route::Flaky {
                    failures: 2,
                    html: html_page("Flaky", &[]),
                },
            ),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.calls_to("https://example.com/flaky"), 3);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.metadata.pages_crawled, 2);
    assert!(dir.path().join("example.com/flaky.md").exists());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockFetcher::new().page(SEED, &html_page("Home", &["/missing"])));

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.calls_to("https://example.com/missing"), 1);
    assert_eq!(report.stats.client_errors, 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.metadata.pages_crawled, 1);
}

#[tokio::test]
async fn test_page_budget_is_never_exceeded() {
    let dir = TempDir::new().unwrap();
    let links: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();

    let mut fetcher = MockFetcher::new().page(SEED, &html_page("Home", &link_refs));
    for i in 0..10 {
        fetcher = fetcher.page(
            &format!("https://example.com/p{}", i),
            &html_page(&format!("Page {}", i), &[]),
        );
    }

    let mut config = test_config(SEED, dir.path());
    config.crawler.max_pages = 3;
    config.crawler.concurrency = 4;

    let report = Orchestrator::new(config, Arc::new(fetcher))
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(report.metadata.pages_crawled, 3);
    assert_eq!(markdown_files(&report.domain_dir).len(), 3);
}

#[tokio::test]
async fn test_no_fetch_after_budget_reached_during_politeness_wait() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/a", "/b", "/c", "/d"]))
            .page("https://example.com/a", &html_page("A", &[]))
            .page("https://example.com/b", &html_page("B", &[]))
            .page("https://example.com/c", &html_page("C", &[]))
            .page("https://example.com/d", &html_page("D", &[])),
    );
    let mut config = test_config(SEED, dir.path());
    config.crawler.max_pages = 2;
    config.crawler.concurrency = 3;
    config.politeness.delay = 0.2;

    let report = Orchestrator::new(config, fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(report.metadata.pages_crawled, 2);
    // Workers queued behind the host delay give up once the budget is spent
    let calls = fetcher.calls();
    assert_eq!(calls.len(), 2, "fetches after the budget was spent: {:?}", calls);
    assert_eq!(calls[0], SEED);
}

#[tokio::test]
async fn test_depth_limit() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/a"]))
            .page("https://example.com/a", &html_page("A", &["/b"]))
            .page("https://example.com/b", &html_page("B", &[])),
    );
    let mut config = test_config(SEED, dir.path());
    config.crawler.max_depth = 1;

    let report = Orchestrator::new(config, fetcher.clone()).run().await.unwrap();

    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(report.metadata.max_depth_reached, 1);
    assert_eq!(fetcher.calls_to("https://example.com/b"), 0);

    // The too-deep link is still listed on the page that has it
    let a = read(dir.path().join("example.com/a.md"));
    assert!(a.contains("1. https://example.com/b\n"));
}

#[tokio::test]
async fn test_redirect_admits_target() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/old"]))
            .route(
                "https://example.com/old",
                Route::Redirect("https://example.com/new".to_string()),
            )
            .page("https://example.com/new", &html_page("New", &[])),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(report.stats.redirects, 1);
    assert!(dir.path().join("example.com/new.md").exists());
    assert!(!dir.path().join("example.com/old.md").exists());
    // The redirect target keeps the depth of the link that led to it
    assert_eq!(report.metadata.max_depth_reached, 1);
}

#[tokio::test]
async fn test_trailing_slash_redirect_is_followed_in_place() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/docs"]))
            .route(
                "https://example.com/docs",
                Route::Redirect("https://example.com/docs/".to_string()),
            )
            .page("https://example.com/docs/", &html_page("Docs", &[])),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(fetcher.calls_to("https://example.com/docs/"), 1);
    let docs = read(dir.path().join("example.com/docs.md"));
    assert!(docs.starts_with("# Docs\n"));
}

#[tokio::test]
async fn test_redirect_loop_is_dropped() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/loop"]))
            .route(
                "https://example.com/loop",
                Route::Redirect("https://example.com/loop".to_string()),
            ),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(fetcher.calls_to("https://example.com/loop"), 6);
    assert_eq!(report.metadata.pages_crawled, 1);
}

/// Store that fails for some URLs, always or just once
struct FlakyStore {
    inner: SiteStore,
    failed_once: AtomicBool,
}

impl PageStore for FlakyStore {
    fn store(&self, document: &Document) -> StorageResult<PathBuf> {
        let path = document.source_url.path();
        if path.contains("bad") {
            return Err(StorageError::InvalidPath("disk says no".to_string()));
        }
        if path.contains("flaky") && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StorageError::InvalidPath("try again".to_string()));
        }
        self.inner.store(document)
    }

    fn path_for(&self, url: &CanonicalUrl) -> PathBuf {
        self.inner.path_for(url)
    }
}

#[tokio::test]
async fn test_storage_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/bad", "/flaky"]))
            .page("https://example.com/bad", &html_page("Bad", &["/behind-bad"]))
            .page("https://example.com/behind-bad", &html_page("Hidden", &[]))
            .page("https://example.com/flaky", &html_page("Flaky", &[])),
    );
    let store = Arc::new(FlakyStore {
        inner: SiteStore::new(dir.path(), false),
        failed_once: AtomicBool::new(false),
    });

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone())
        .with_page_store(store)
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(report.metadata.pages_crawled, 2);
    assert_eq!(report.stats.storage_failures, 3);
    assert!(dir.path().join("example.com/flaky.md").exists());
    assert!(!dir.path().join("example.com/bad.md").exists());
    // Links of a page that was never written are not followed
    assert_eq!(fetcher.calls_to("https://example.com/behind-bad"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_mid_crawl() {
    let dir = TempDir::new().unwrap();
    let links: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();

    let mut fetcher = MockFetcher::new()
        .with_latency(Duration::from_millis(50))
        .page(SEED, &html_page("Home", &link_refs));
    for i in 0..20 {
        fetcher = fetcher.page(
            &format!("https://example.com/p{}", i),
            &html_page(&format!("Page {}", i), &[]),
        );
    }

    let orchestrator = Orchestrator::new(test_config(SEED, dir.path()), Arc::new(fetcher));
    let handle = orchestrator.handle();
    let watcher = tokio::spawn(async move {
        while handle.pages_saved() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.cancel();
    });

    let report = orchestrator.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(report.phase, CrawlPhase::Cancelled);
    let saved = report.metadata.pages_crawled as usize;
    assert!(saved >= 2 && saved < 21, "saved {}", saved);
    assert_eq!(markdown_files(&report.domain_dir).len(), saved);
    assert!(temp_files(dir.path()).is_empty());

    let meta = load_metadata(&report.domain_dir.join("metadata.json"))
        .unwrap()
        .unwrap();
    assert_eq!(meta.status, CrawlPhase::Cancelled);
    assert_eq!(meta.pages_crawled as usize, saved);
}

#[tokio::test]
async fn test_cancellation_before_start_saves_nothing() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockFetcher::new().page(SEED, &html_page("Home", &[])));

    let orchestrator = Orchestrator::new(test_config(SEED, dir.path()), fetcher.clone());
    orchestrator.handle().cancel();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.phase, CrawlPhase::Cancelled);
    assert_eq!(report.metadata.pages_crawled, 0);
    assert!(markdown_files(dir.path()).is_empty());
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_grace_period_aborts_slow_fetches() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_latency(Duration::from_secs(30))
            .page(SEED, &html_page("Home", &[])),
    );
    let mut config = test_config(SEED, dir.path());
    config.crawler.grace_period_secs = 0;

    let orchestrator = Orchestrator::new(config, fetcher);
    let handle = orchestrator.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let report = orchestrator.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.phase, CrawlPhase::Cancelled);
    assert!(markdown_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_worker_panic_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(SEED, &html_page("Home", &["/boom"]))
            .route("https://example.com/boom", Route::Panic),
    );

    let report = Orchestrator::new(test_config(SEED, dir.path()), fetcher)
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Failed);
    assert_eq!(report.metadata.pages_crawled, 1);
    let meta = load_metadata(&report.domain_dir.join("metadata.json"))
        .unwrap()
        .unwrap();
    assert_eq!(meta.status, CrawlPhase::Failed);
}

#[tokio::test]
async fn test_invalid_seed_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let fetcher = Arc::new(MockFetcher::new());

    let orchestrator = Orchestrator::new(test_config("ftp://example.com/", &out), fetcher.clone());
    let result = orchestrator.run().await;

    assert!(matches!(
        result,
        Err(ScribeError::Config(ConfigError::InvalidUrl(_)))
    ));
    assert_eq!(orchestrator.phase(), CrawlPhase::Failed);
    assert!(!out.exists());
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_unusable_output_dir_fails_before_fetching() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();
    let fetcher = Arc::new(MockFetcher::new().page(SEED, &html_page("Home", &[])));

    let orchestrator =
        Orchestrator::new(test_config(SEED, &blocker.join("out")), fetcher.clone());
    let result = orchestrator.run().await;

    assert!(matches!(
        result,
        Err(ScribeError::Config(ConfigError::OutputDir { .. }))
    ));
    assert_eq!(orchestrator.phase(), CrawlPhase::Failed);
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockFetcher::new().page(SEED, &html_page("Home", &[])));
    let orchestrator = Orchestrator::new(test_config(SEED, dir.path()), fetcher);

    orchestrator.run().await.unwrap();
    let second = orchestrator.run().await;

    assert!(matches!(
        second,
        Err(ScribeError::InvalidTransition {
            from: CrawlPhase::Completed,
            to: CrawlPhase::Running
        })
    ));
}

#[derive(Clone, Default)]
struct RecordingHooks {
    events: Arc<Mutex<Vec<String>>>,
}

impl CrawlHooks for RecordingHooks {
    fn pre_crawl(&self, start: &CrawlStart) {
        self.events.lock().push(format!("pre {}", start.seed));
    }

    fn post_crawl(&self, report: &CrawlReport) {
        self.events
            .lock()
            .push(format!("post {} {}", report.phase, report.metadata.pages_crawled));
    }
}

#[tokio::test]
async fn test_hooks_run_around_the_crawl() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockFetcher::new().page(SEED, &html_page("Home", &[])));
    let hooks = RecordingHooks::default();

    Orchestrator::new(test_config(SEED, dir.path()), fetcher)
        .with_hooks(hooks.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        *hooks.events.lock(),
        vec![
            "pre https://example.com/".to_string(),
            "post completed 1".to_string()
        ]
    );
}
