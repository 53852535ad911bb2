//! Time source used by the domain registry and frontier
//!
//! Monotonic time comes from `tokio::time::Instant`, so tests running with a
//! paused runtime clock observe virtual time. Checkpoints need wall-clock
//! timestamps, so every clock can convert between the two.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A source of monotonic and wall-clock time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Current wall-clock time
    fn wall_now(&self) -> DateTime<Utc>;

    /// Converts a monotonic instant to wall-clock time
    fn to_wall(&self, instant: Instant) -> DateTime<Utc> {
        let now = self.now();
        let wall = self.wall_now();
        if instant <= now {
            wall - to_chrono(now - instant)
        } else {
            wall + to_chrono(instant - now)
        }
    }

    /// Converts a wall-clock timestamp back to a monotonic instant
    ///
    /// Timestamps in the future, or older than the monotonic origin of this
    /// process, map to now.
    fn from_wall(&self, wall: DateTime<Utc>) -> Instant {
        let now = self.now();
        let age = (self.wall_now() - wall).to_std().unwrap_or(Duration::ZERO);
        now.checked_sub(age).unwrap_or(now)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Clock backed by the tokio runtime clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.wall_origin + to_chrono(self.offset())
    }
}
