//! Replication Module
//!
//! Ties membership, the local tree and anti-entropy together into the
//! distributed store.
//!
//! ## Core Mechanisms
//! - **Owner Routing**: every read and write for key `K` is served by the first
//!   member at or after `hash(K)`; other nodes forward to it.
//! - **Chain Replication**: the owner stamps a write and hands a copy to its
//!   successor, which passes it on until `redundancy` nodes hold it. Failed
//!   successors are dropped and the copy goes to the next one.
//! - **Repair**: a periodic sync reconciles the owned arc with the replicas,
//!   and a periodic clean hands keys a node should no longer hold to their
//!   owners.

pub mod coordinator;
pub mod handlers;
pub mod protocol;
pub mod types;

pub use coordinator::{Coordinator, stored_key};
pub use protocol::{ReadRequest, ReadResponse};
pub use types::{Description, Item, Range, WriteKind, WriteRequest};

#[cfg(test)]
mod tests;
