//! Run-relative time.
//!
//! Every milestone is an offset from the instant the run started. Offsets
//! observed locally come from a monotonic clock; offsets reported by the
//! runtime are converted from wall-clock timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Origin of one benchmark run's timeline.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started_at: DateTime<Utc>,
    origin: Instant,
}

impl RunClock {
    /// Starts a new timeline at the current instant.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            origin: Instant::now(),
        }
    }

    /// Wall-clock instant the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Converts a wall-clock timestamp into a run offset.
    ///
    /// Timestamps earlier than the run start clamp to zero.
    #[must_use]
    pub fn offset_of(&self, at: DateTime<Utc>) -> Duration {
        (at - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }
}
