//! Crawl statistics
//!
//! Counters are updated by the workers while the crawl runs and frozen into a
//! [`StatsSnapshot`] for the final report.

use crate::crawler::CrawlReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live crawl counters
#[derive(Debug, Default)]
pub struct CrawlStatistics {
    /// Requests sent, retries included
    pub fetch_attempts: AtomicU64,

    /// 2xx responses
    pub successes: AtomicU64,

    pub redirects: AtomicU64,
    pub client_errors: AtomicU64,
    pub server_errors: AtomicU64,
    pub network_errors: AtomicU64,
    pub timeouts: AtomicU64,

    /// Attempts beyond the first for the same page
    pub retries: AtomicU64,

    /// Pages given up on (fetch failures, write failures, budget)
    pub pages_dropped: AtomicU64,

    /// Failed document writes, including ones that succeeded on retry
    pub storage_failures: AtomicU64,

    /// Links found on saved pages, internal and external
    pub links_discovered: AtomicU64,

    /// Links accepted into the frontier
    pub links_admitted: AtomicU64,
}

impl CrawlStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            fetch_attempts: load(&self.fetch_attempts),
            successes: load(&self.successes),
            redirects: load(&self.redirects),
            client_errors: load(&self.client_errors),
            server_errors: load(&self.server_errors),
            network_errors: load(&self.network_errors),
            timeouts: load(&self.timeouts),
            retries: load(&self.retries),
            pages_dropped: load(&self.pages_dropped),
            storage_failures: load(&self.storage_failures),
            links_discovered: load(&self.links_discovered),
            links_admitted: load(&self.links_admitted),
        }
    }
}

/// Point-in-time copy of [`CrawlStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub fetch_attempts: u64,
    pub successes: u64,
    pub redirects: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub network_errors: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub pages_dropped: u64,
    pub storage_failures: u64,
    pub links_discovered: u64,
    pub links_admitted: u64,
}

impl StatsSnapshot {
    pub fn failures(&self) -> u64 {
        self.client_errors + self.server_errors + self.network_errors + self.timeouts
    }
}

/// Prints a crawl report to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The finished crawl's report
pub fn print_statistics(report: &CrawlReport) {
    let meta = &report.metadata;
    let stats = &report.stats;

    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Status: {}", report.phase);
    println!("  Start URL: {}", meta.start_url);
    println!("  Output: {}", report.domain_dir.display());
    println!("  Pages saved: {}", meta.pages_crawled);
    println!("  Max depth reached: {}", meta.max_depth_reached);
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();

    println!("Requests:");
    println!("  Attempts: {}", stats.fetch_attempts);
    println!("  Successful: {}", stats.successes);
    println!("  Redirects: {}", stats.redirects);
    println!("  Retries: {}", stats.retries);
    println!();

    if stats.failures() > 0 || stats.storage_failures > 0 {
        println!("Error Summary:");
        let mut errors = vec![
            ("Client errors", stats.client_errors),
            ("Server errors", stats.server_errors),
            ("Network errors", stats.network_errors),
            ("Timeouts", stats.timeouts),
            ("Storage failures", stats.storage_failures),
        ];
        errors.retain(|(_, count)| *count > 0);
        errors.sort_by(|a, b| b.1.cmp(&a.1));
        for (label, count) in errors {
            println!("  {}: {}", label, count);
        }
        println!();
    }

    println!("Links:");
    println!("  Discovered: {}", stats.links_discovered);
    println!("  Admitted: {}", stats.links_admitted);
    println!("  Pages dropped: {}", stats.pages_dropped);
    println!();

    let success_rate = if stats.fetch_attempts > 0 {
        (stats.successes as f64 / stats.fetch_attempts as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} requests)",
        success_rate, stats.successes, stats.fetch_attempts
    );
}
