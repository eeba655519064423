use std::time::Duration;
use tokio::time::Instant;

/// Tracks the politeness state of one host during crawling
///
/// This structure holds the last dispatch time and the delay that must elapse
/// before the next request to the same host may be sent.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Number of requests dispatched to this host in the current crawl
    pub dispatch_count: u64,

    /// Timestamp of the last dispatch to this host
    pub last_dispatch: Option<Instant>,

    /// Minimum spacing between consecutive dispatches
    pub delay: Duration,
}

impl HostState {
    pub fn new(delay: Duration) -> Self {
        Self {
            dispatch_count: 0,
            last_dispatch: None,
            delay,
        }
    }

    /// Checks if a request can be dispatched to this host at `now`
    pub fn can_dispatch(&self, now: Instant) -> bool {
        self.time_until_next_dispatch(now).is_none()
    }

    /// Records that a request was dispatched to this host
    pub fn record_dispatch(&mut self, now: Instant) {
        self.dispatch_count += 1;
        self.last_dispatch = Some(now);
    }

    /// Calculates the time until the next request can be dispatched
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_dispatch(&self, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.delay {
            Some(self.delay - elapsed)
        } else {
            None
        }
    }
}
