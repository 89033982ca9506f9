//! Wall-clock time anchored to the tokio monotonic clock.
//!
//! Readings and the filter's notion of "now" both come from a `SessionClock`,
//! so they stay consistent with tokio timers (including paused test time).

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed()).unwrap_or(chrono::Duration::zero());
        self.wall + elapsed
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
