//! Helpers shared by the in-process cluster tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::clock::TimeSource;
use crate::config::NodeConfig;
use crate::hash::Position;

/// Polls `$check` (which may `.await`) until it holds, panicking after
/// `$limit`.
macro_rules! assert_within {
    ($limit:expr, $what:expr, $check:expr) => {{
        let deadline = tokio::time::Instant::now() + $limit;
        loop {
            if $check {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {}", $what);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }};
}

pub(crate) use assert_within;

/// Local node with fast loops and short retries. Positions stay where they
/// are put.
pub(crate) fn fast_config(pos: Option<Position>) -> NodeConfig {
    NodeConfig {
        addr: "127.0.0.1:0".to_string(),
        position: pos.map(|p| p.to_string()),
        notify_interval_ms: 50,
        ping_interval_ms: 50,
        sync_interval_ms: 100,
        migrate: false,
        rpc_timeout_ms: 500,
        rpc_attempts: 2,
        rpc_backoff_ms: 20,
        forward_attempts: Some(8),
        ..Default::default()
    }
}

/// `i`-th of `n` evenly spread coordinates.
pub(crate) fn spread(i: usize, n: usize) -> Position {
    Position::from_u128((u128::MAX / n as u128) * i as u128)
}

/// Logical clock that only moves when told to.
pub(crate) struct ManualClock(AtomicI64);

impl ManualClock {
    pub(crate) fn at(now: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now)))
    }

    pub(crate) fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn actual_time(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    fn continuous_time(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}
