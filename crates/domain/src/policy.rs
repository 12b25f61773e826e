//! Lookback window applied to fetched posts
//!
//! Post sources restrict their results to the window, and the orchestrator
//! applies it again before classification. Both filters stay in place.

use time::{Duration, OffsetDateTime};

/// Trailing time window outside of which a post is stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    span: Duration,
}

impl LookbackWindow {
    /// The fixed 24-hour window used by the daily pipeline
    pub const fn daily() -> Self {
        Self {
            span: Duration::hours(24),
        }
    }

    /// Oldest admissible publication time relative to `now`
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.span
    }

    /// Posts without a timestamp are admitted; timestamped ones must not predate the cutoff
    pub fn admits(&self, published_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
        match published_at {
            Some(ts) => ts >= self.cutoff(now),
            None => true,
        }
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self::daily()
    }
}
