//! Per-host politeness
//!
//! Each host has its own async lock around a [`HostState`]. A worker holds
//! the lock while it sleeps out the remaining delay, so requests to one host
//! are spaced at least `delay` apart while other hosts proceed independently.

use crate::config::PolitenessConfig;
use crate::state::HostState;
use crate::url::CanonicalUrl;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct RateController {
    default_delay: Duration,
    overrides: HashMap<String, Duration>,
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<HostState>>>>,
}

impl RateController {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            overrides: HashMap::new(),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PolitenessConfig) -> Self {
        Self::new(config.default_delay()).with_overrides(config.host_delays())
    }

    /// Adds per-host delays, keyed by host or `host:port`
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a str, Duration)>,
    ) -> Self {
        for (host, delay) in overrides {
            self.overrides.insert(host.to_lowercase(), delay);
        }
        self
    }

    /// Delay that applies to the host of `url`
    pub fn delay_for(&self, url: &CanonicalUrl) -> Duration {
        self.overrides
            .get(&url.host_key())
            .or_else(|| self.overrides.get(url.host()))
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Waits until a request to the host of `url` may be sent, then records it
    ///
    /// Returns how long the call slept. Dropping the future before it
    /// completes records nothing.
    pub async fn await_turn(&self, url: &CanonicalUrl) -> Duration {
        let slot = self.host_slot(url);
        let mut state = slot.lock().await;

        let wait = state
            .time_until_next_dispatch(Instant::now())
            .unwrap_or_default();
        if !wait.is_zero() {
            tracing::debug!("Waiting {:?} before requesting {}", wait, url);
            tokio::time::sleep(wait).await;
        }

        state.record_dispatch(Instant::now());
        wait
    }

    /// Number of requests dispatched to `host_key` so far
    pub async fn dispatch_count(&self, host_key: &str) -> u64 {
        let slot = self.hosts.lock().get(host_key).cloned();
        match slot {
            Some(slot) => slot.lock().await.dispatch_count,
            None => 0,
        }
    }

    fn host_slot(&self, url: &CanonicalUrl) -> Arc<tokio::sync::Mutex<HostState>> {
        let delay = self.delay_for(url);
        let mut hosts = self.hosts.lock();
        hosts
            .entry(url.host_key())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(HostState::new(delay))))
            .clone()
    }
}
