//! Node configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use ringstore::config::NodeConfig;
//!
//! let config: NodeConfig = serde_json::from_str("{}").unwrap();
//! assert_eq!(config.redundancy, 3);
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::hash::Position;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Listen address; empty means discover an outbound address.
    #[serde(default)]
    pub addr: String,

    /// Fixed ring coordinate as 32 hex digits. Unset nodes take a slot on join.
    #[serde(default)]
    pub position: Option<String>,

    /// Copies kept of every key.
    #[serde(default = "default_redundancy")]
    pub redundancy: usize,

    /// Stabilization period (notify successor).
    #[serde(default = "default_interval_ms")]
    pub notify_interval_ms: u64,

    /// Predecessor health check period.
    #[serde(default = "default_interval_ms")]
    pub ping_interval_ms: u64,

    /// Anti-entropy and clean period.
    #[serde(default = "default_interval_ms")]
    pub sync_interval_ms: u64,

    /// Move this node's position to even out load with its successor.
    #[serde(default = "default_migrate")]
    pub migrate: bool,

    /// Tombstones older than this are pruned.
    #[serde(default = "default_zombie_lifetime_ms")]
    pub zombie_lifetime_ms: u64,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_rpc_attempts")]
    pub rpc_attempts: usize,
    #[serde(default = "default_rpc_backoff_ms")]
    pub rpc_backoff_ms: u64,

    /// Successors tried when forwarding a replica write; unset retries until
    /// the ring has no other member.
    #[serde(default)]
    pub forward_attempts: Option<usize>,
}

fn default_redundancy() -> usize {
    3
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_migrate() -> bool {
    true
}
fn default_zombie_lifetime_ms() -> u64 {
    5 * 60 * 1000
}
fn default_rpc_timeout_ms() -> u64 {
    1000
}
fn default_rpc_attempts() -> usize {
    3
}
fn default_rpc_backoff_ms() -> u64 {
    150
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            position: None,
            redundancy: default_redundancy(),
            notify_interval_ms: default_interval_ms(),
            ping_interval_ms: default_interval_ms(),
            sync_interval_ms: default_interval_ms(),
            migrate: default_migrate(),
            zombie_lifetime_ms: default_zombie_lifetime_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            rpc_attempts: default_rpc_attempts(),
            rpc_backoff_ms: default_rpc_backoff_ms(),
            forward_attempts: None,
        }
    }
}

impl NodeConfig {
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Zombie lifetime in nanoseconds, the unit write stamps use.
    pub fn zombie_lifetime_nanos(&self) -> i64 {
        (self.zombie_lifetime_ms as i64).saturating_mul(1_000_000)
    }

    pub fn parsed_position(&self) -> anyhow::Result<Option<Position>> {
        match &self.position {
            Some(hex) => Ok(Some(hex.parse().map_err(|e| {
                anyhow::anyhow!("invalid position {:?}: {}", hex, e)
            })?)),
            None => Ok(None),
        }
    }
}
