//! Crawl metadata (`metadata.json`)
//!
//! One file per crawled domain. It is rewritten read-merge-write under a
//! single lock: every N saved pages and once more when the crawl ends.

use crate::config::Config;
use crate::state::CrawlPhase;
use crate::storage::traits::StorageResult;
use crate::storage::writer::write_atomic;
use crate::url::QueryPolicy;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Aggregate state of one crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlMetadata {
    pub domain: String,
    pub start_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_crawled: u64,
    pub max_depth_reached: u32,
    pub status: CrawlPhase,
    pub config: ConfigSnapshot,
}

impl CrawlMetadata {
    pub fn new(
        domain: impl Into<String>,
        start_url: impl Into<String>,
        started_at: DateTime<Utc>,
        config: ConfigSnapshot,
    ) -> Self {
        Self {
            domain: domain.into(),
            start_url: start_url.into(),
            started_at,
            finished_at: None,
            pages_crawled: 0,
            max_depth_reached: 0,
            status: CrawlPhase::Running,
            config,
        }
    }

    /// Whether `other` was written by this same run
    fn same_run(&self, other: &CrawlMetadata) -> bool {
        self.start_url == other.start_url && self.started_at == other.started_at
    }

    /// Folds counters from an earlier write of the same run into `self`
    ///
    /// Counters only grow during a run, so taking the maximum makes repeated
    /// or reordered flushes converge on the same file.
    fn merge_from(&mut self, on_disk: &CrawlMetadata) {
        if !self.same_run(on_disk) {
            return;
        }
        self.pages_crawled = self.pages_crawled.max(on_disk.pages_crawled);
        self.max_depth_reached = self.max_depth_reached.max(on_disk.max_depth_reached);
    }
}

/// The settings a run was started with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub max_depth: u32,
    pub max_pages: usize,
    pub delay: f64,
    pub concurrency: usize,
    pub follow_external: bool,
    pub include_assets: bool,
    pub max_retries: u32,
    pub user_agent: String,
    pub query_policy: QueryPolicy,
    pub output_dir: String,
    pub config_hash: String,
}

impl ConfigSnapshot {
    pub fn from_config(config: &Config, config_hash: impl Into<String>) -> Self {
        Self {
            max_depth: config.crawler.max_depth,
            max_pages: config.crawler.max_pages,
            delay: config.politeness.delay,
            concurrency: config.crawler.concurrency,
            follow_external: config.crawler.follow_external,
            include_assets: config.crawler.include_assets,
            max_retries: config.crawler.max_retries,
            user_agent: config.crawler.user_agent.clone(),
            query_policy: config.crawler.query_policy,
            output_dir: config.output.output_dir.display().to_string(),
            config_hash: config_hash.into(),
        }
    }
}

/// Reads a metadata file; `Ok(None)` when it does not exist
pub fn load_metadata(path: &Path) -> StorageResult<Option<CrawlMetadata>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct MetadataState {
    metadata: CrawlMetadata,
    unflushed: usize,
}

/// Single-writer owner of a run's [`CrawlMetadata`]
pub struct MetadataStore {
    path: PathBuf,
    flush_interval: usize,
    state: Mutex<MetadataState>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>, metadata: CrawlMetadata, flush_interval: usize) -> Self {
        Self {
            path: path.into(),
            flush_interval: flush_interval.max(1),
            state: Mutex::new(MetadataState {
                metadata,
                unflushed: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> CrawlMetadata {
        self.state.lock().metadata.clone()
    }

    /// Counts one saved page at `depth`, flushing every `flush_interval` pages
    ///
    /// Returns true when this call flushed the file.
    pub fn record_page(&self, depth: u32) -> StorageResult<bool> {
        let mut state = self.state.lock();
        state.metadata.pages_crawled += 1;
        state.metadata.max_depth_reached = state.metadata.max_depth_reached.max(depth);
        state.unflushed += 1;

        if state.unflushed < self.flush_interval {
            return Ok(false);
        }

        self.write_merged(&mut state.metadata)?;
        state.unflushed = 0;
        Ok(true)
    }

    /// Rewrites the metadata file now
    pub fn flush(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        self.write_merged(&mut state.metadata)?;
        state.unflushed = 0;
        Ok(())
    }

    /// Records the run's final status and end time, then flushes
    pub fn finalize(&self, status: CrawlPhase, finished_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.metadata.status = status;
        state.metadata.finished_at = Some(finished_at);
        self.write_merged(&mut state.metadata)?;
        state.unflushed = 0;
        Ok(())
    }

    /// Read-merge-write; callers hold the state lock
    fn write_merged(&self, metadata: &mut CrawlMetadata) -> StorageResult<()> {
        match load_metadata(&self.path) {
            Ok(Some(on_disk)) => metadata.merge_from(&on_disk),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable metadata at {}: {}",
                    self.path.display(),
                    e
                );
            }
        }

        let json = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.path, &json)?;
        tracing::trace!(
            "Flushed metadata: {} pages, max depth {}",
            metadata.pages_crawled,
            metadata.max_depth_reached
        );
        Ok(())
    }
}
