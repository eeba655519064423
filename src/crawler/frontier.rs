//! Crawl frontier with built-in deduplication
//!
//! The frontier is a FIFO of pages waiting to be fetched. Admission
//! canonicalizes the URL, applies the depth, scope and file-type rules and
//! records the URL as visited under the same lock that enqueues it, so a URL
//! is admitted at most once per crawl no matter how many workers find it.

use crate::url::{is_crawlable, CanonicalUrl, Canonicalizer, SiteScope};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Notify;

/// A page waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: CanonicalUrl,

    /// Link distance from the seed (the seed is 0)
    pub depth: u32,

    /// Page the link was found on; `None` for the seed
    pub parent: Option<CanonicalUrl>,
}

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
    TooDeep,
    OutOfScope,
    NotCrawlable,
    Invalid,
    Closed,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<CanonicalUrl>,
    in_flight: usize,
    closed: bool,
}

/// Concurrency-safe FIFO of [`FrontierEntry`] plus the visited set
pub struct Frontier {
    canonicalizer: Canonicalizer,
    scope: SiteScope,
    max_depth: u32,
    follow_external: bool,
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    pub fn new(
        canonicalizer: Canonicalizer,
        scope: SiteScope,
        max_depth: u32,
        follow_external: bool,
    ) -> Self {
        Self {
            canonicalizer,
            scope,
            max_depth,
            follow_external,
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
        }
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn scope(&self) -> &SiteScope {
        &self.scope
    }

    /// Canonicalizes `raw` and offers it at `depth`
    pub fn admit(&self, raw: &str, depth: u32, parent: Option<&CanonicalUrl>) -> Admission {
        match self.canonicalizer.canonicalize(raw) {
            Ok(url) => self.admit_canonical(url, depth, parent.cloned()),
            Err(e) => {
                tracing::trace!("Rejecting {}: {}", raw, e);
                Admission::Invalid
            }
        }
    }

    /// Convenience form of [`Frontier::admit`]
    pub fn try_admit(&self, raw: &str, depth: u32, parent: Option<&CanonicalUrl>) -> bool {
        self.admit(raw, depth, parent).is_admitted()
    }

    /// Offers an already canonical URL
    ///
    /// Rejections leave the frontier untouched. On admission the URL is
    /// marked visited and appended to the queue in one step.
    pub fn admit_canonical(
        &self,
        url: CanonicalUrl,
        depth: u32,
        parent: Option<CanonicalUrl>,
    ) -> Admission {
        if depth > self.max_depth {
            return Admission::TooDeep;
        }
        if !self.follow_external && !self.scope.contains(&url) {
            return Admission::OutOfScope;
        }
        if !is_crawlable(&url) {
            return Admission::NotCrawlable;
        }

        {
            let mut state = self.state.lock();
            if state.closed {
                return Admission::Closed;
            }
            if !state.visited.insert(url.clone()) {
                return Admission::Duplicate;
            }
            tracing::trace!("Admitted {} at depth {}", url, depth);
            state.queue.push_back(FrontierEntry { url, depth, parent });
        }

        self.notify.notify_waiters();
        Admission::Admitted
    }

    /// Takes up to `n` of the oldest entries
    ///
    /// Waits while the queue is empty. Returns an empty batch once the
    /// frontier is closed, which is the signal for workers to stop.
    pub async fn dequeue_batch(&self, n: usize) -> Vec<FrontierEntry> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Vec::new();
                }
                if !state.queue.is_empty() {
                    let take = n.max(1).min(state.queue.len());
                    let batch: Vec<FrontierEntry> = state.queue.drain(..take).collect();
                    state.in_flight += batch.len();
                    return batch;
                }
            }

            notified.await;
        }
    }

    /// Marks `n` dequeued entries as finished
    ///
    /// Returns true if this drained the frontier: nothing queued, nothing in
    /// flight. A drained frontier closes itself.
    pub fn complete(&self, n: usize) -> bool {
        let drained = {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(n);
            if !state.closed && state.in_flight == 0 && state.queue.is_empty() {
                state.closed = true;
                true
            } else {
                false
            }
        };

        if drained {
            tracing::debug!("Frontier drained");
            self.notify.notify_waiters();
        }
        drained
    }

    /// Stops the frontier; queued entries are abandoned
    ///
    /// Returns how many entries were abandoned.
    pub fn close(&self) -> usize {
        let abandoned = {
            let mut state = self.state.lock();
            state.closed = true;
            let abandoned = state.queue.len();
            state.queue.clear();
            abandoned
        };
        self.notify.notify_waiters();
        abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Entries waiting to be dequeued
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn visited_count(&self) -> usize {
        self.state.lock().visited.len()
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.state.lock().visited.contains(url)
    }
}
