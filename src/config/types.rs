use crate::url::QueryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sitescribe
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// usable configuration once a seed URL is supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL the crawl starts from
    #[serde(rename = "seed-url", skip_serializing_if = "Option::is_none")]
    pub seed_url: Option<String>,

    pub crawler: CrawlerConfig,
    pub politeness: PolitenessConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Default configuration crawling from `seed`
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed_url: Some(seed.into()),
            ..Self::default()
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed (the seed is depth 0)
    pub max_depth: u32,

    /// Maximum number of pages written to disk
    pub max_pages: usize,

    /// Number of concurrent fetch workers
    pub concurrency: usize,

    /// Whether pages on other sites are crawled too
    pub follow_external: bool,

    /// Whether image/script/stylesheet references are recorded
    pub include_assets: bool,

    /// Attempts per page (first one included) for 5xx, network errors and timeouts
    pub max_retries: u32,

    /// Backoff before the first retry (milliseconds); doubles per retry
    pub retry_backoff_ms: u64,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// How query strings take part in URL identity
    pub query_policy: QueryPolicy,

    /// How long in-flight pages may finish after cancellation (seconds)
    pub grace_period_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            concurrency: 5,
            follow_external: false,
            include_assets: false,
            max_retries: 3,
            retry_backoff_ms: 500,
            request_timeout_secs: 30,
            user_agent: default_user_agent(),
            query_policy: QueryPolicy::default(),
            grace_period_secs: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Per-host request spacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (seconds)
    pub delay: f64,

    /// Delay overrides keyed by host (or `host:port`)
    pub per_host: BTreeMap<String, f64>,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay: 1.0,
            per_host: BTreeMap::new(),
        }
    }
}

impl PolitenessConfig {
    pub fn default_delay(&self) -> Duration {
        seconds(self.delay)
    }

    pub fn host_delays(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.per_host
            .iter()
            .map(|(host, secs)| (host.as_str(), seconds(*secs)))
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory; each crawled domain gets a subdirectory
    pub output_dir: PathBuf,

    /// metadata.json is rewritten after this many saved pages
    pub metadata_flush_interval: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sites"),
            metadata_flush_interval: 10,
        }
    }
}

/// Negative or non-finite values (rejected by validation) map to zero
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

fn default_user_agent() -> String {
    format!("sitescribe/{}", env!("CARGO_PKG_VERSION"))
}
