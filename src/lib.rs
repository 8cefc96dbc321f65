//! Peer-to-Peer Consistent-Hashing Key/Value Store
//!
//! This library crate holds everything a node runs. The binary (`main.rs`) only
//! parses flags, builds a [`replication::Coordinator`] and waits for Ctrl+C.
//!
//! ## Architecture Modules
//! - **`hash`**: 128-bit ring positions (`Position`) and the digest used by
//!   every Merkle hash.
//! - **`ring`**: A node's sorted view of the other members (`Ring`), with
//!   successor/predecessor lookup, slot selection and a hash of the view.
//! - **`tree`**: The versioned radix tree with per-node Merkle hashes, nested
//!   sub-trees, tombstones and ordered/indexed range reads.
//! - **`anti_entropy`**: Merkle-guided reconciliation of two trees, local or
//!   remote, optionally restricted to a position range or destructive.
//! - **`membership`**: Node lifecycle, RPC server, join, stabilization and
//!   failure detection.
//! - **`replication`**: Owner routing, chain replication, the full read API and
//!   the background sync, clean and migrate loops.
//! - **`transport`**: The HTTP/bincode RPC client (`Switchboard`) and codec.
//! - **`config`**, **`clock`**, **`error`**: Node settings, time sources and
//!   the typed errors surfaced to callers.

pub mod anti_entropy;
pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod membership;
pub mod replication;
pub mod ring;
pub mod transport;
pub mod tree;

#[cfg(test)]
mod testutil;
