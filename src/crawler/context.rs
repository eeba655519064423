//! Shared state of a running crawl
//!
//! The orchestrator builds one [`CrawlContext`] per run and hands an `Arc` of
//! it to every worker.

use crate::crawler::fetcher::{FetchOptions, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::rate_controller::RateController;
use crate::crawler::retry::RetryPolicy;
use crate::output::CrawlStatistics;
use crate::storage::{MetadataStore, PageStore};
use crate::transform::ContentTransformer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Page budget with reservation
///
/// A worker reserves a slot before writing a page and commits it once the
/// write succeeded, or releases it if the write failed. Reservations never
/// exceed `max`, so neither do saved pages.
#[derive(Debug)]
pub struct PageBudget {
    max: usize,
    reserved: AtomicUsize,
    saved: AtomicUsize,
}

impl PageBudget {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            reserved: AtomicUsize::new(0),
            saved: AtomicUsize::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Claims a slot; false once every slot is reserved or used
    pub fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                (r < self.max).then_some(r + 1)
            })
            .is_ok()
    }

    /// Gives back a reserved slot that was not used
    pub fn release(&self) {
        let _ = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
    }

    /// Turns a reservation into a saved page; returns the new saved count
    pub fn commit(&self) -> usize {
        self.saved.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.saved() >= self.max
    }
}

/// Count of page writes running on the blocking pool
///
/// A write keeps going when the task that started it is aborted, so the
/// orchestrator waits here before the final metadata write.
#[derive(Debug, Default)]
pub struct PendingWrites {
    active: AtomicUsize,
    idle: Notify,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a write as started until the guard is dropped
    pub fn enter(self: &Arc<Self>) -> WriteGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        WriteGuard {
            writes: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Waits until no write is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct WriteGuard {
    writes: Arc<PendingWrites>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.writes.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.writes.idle.notify_waiters();
        }
    }
}

/// Everything a worker needs to process frontier entries
pub struct CrawlContext {
    pub frontier: Frontier,
    pub rate: RateController,
    pub fetcher: Arc<dyn PageFetcher>,
    pub fetch_options: FetchOptions,
    pub retry: RetryPolicy,
    pub transformer: ContentTransformer,
    pub store: Arc<dyn PageStore>,
    pub metadata: MetadataStore,
    pub budget: Arc<PageBudget>,
    pub stats: Arc<CrawlStatistics>,
    pub writes: Arc<PendingWrites>,
    pub cancel: CancellationToken,
    pub started: Instant,
}
