//! Lifecycle phases of a crawl run
//!
//! A run moves `Idle -> Running` once, then ends in exactly one of the
//! terminal phases.

use crate::ScribeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlPhase {
    /// Created but not started
    Idle,

    /// Workers are fetching pages
    Running,

    // ===== Terminal States =====
    /// Frontier drained or page budget reached
    Completed,

    /// Stopped by an external cancellation signal
    Cancelled,

    /// A fatal precondition or internal invariant failed
    Failed,
}

impl CrawlPhase {
    /// Returns true if this is a terminal phase (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Returns true for the phases that end with exit code 0
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::Failed)
        )
    }

    /// Returns the next phase, or an error if the move is not allowed
    pub fn transition(self, next: CrawlPhase) -> Result<CrawlPhase, ScribeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ScribeError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// String form used in metadata.json
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
