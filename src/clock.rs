//! Time sources for stamping writes.
//!
//! Stamps only need to be comparable across nodes, so the default clock is the
//! wall clock forced to move strictly forward within a process.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock nanoseconds since the epoch.
pub fn wall_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

pub trait TimeSource: Send + Sync {
    /// Current time in nanoseconds since the epoch.
    fn actual_time(&self) -> i64;

    /// Like `actual_time`, but never returns the same value twice.
    fn continuous_time(&self) -> i64;
}

#[derive(Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSource for SystemClock {
    fn actual_time(&self) -> i64 {
        wall_nanos()
    }

    fn continuous_time(&self) -> i64 {
        let now = self.actual_time();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }
}
