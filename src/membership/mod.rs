//! Membership & Stabilization Module
//!
//! Keeps each node's view of the ring converging on the real cluster without
//! any central coordinator.
//!
//! ## Core Mechanisms
//! - **Stabilization**: every node periodically notifies its successor, adopts
//!   the successor's view and trims it to the arc it cares about.
//! - **Health Check**: the predecessor is pinged; a silent one is dropped from
//!   the local view only.
//! - **Ownership Resolution**: `get_successor_for` walks predecessors until the
//!   owner of a coordinate is found, removing unreachable hops on the way.

pub mod handlers;
pub mod protocol;
pub mod service;
pub mod types;

pub use service::MembershipNode;
pub use types::NodeState;
