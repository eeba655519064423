//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: lifecycle of a crawl run (idle, running, completed, cancelled, failed)
//! - `HostState`: per-host dispatch timing for politeness delays

mod crawl_phase;
mod host_state;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use host_state::HostState;
