//! Merkle Radix Tree
//!
//! Local versioned key/value storage. Keys are split into nibbles and stored
//! in a path-compressed radix tree; every node caches a content hash over its
//! subtree so two trees can be compared top-down one node at a time.
//!
//! ## Core Mechanisms
//! - **Rehash on write**: each mutation recomputes hashes and live/total
//!   counts along the modified path only.
//! - **Tombstones**: deletes that must replicate leave a stamped marker,
//!   pruned after the zombie lifetime.
//! - **Sub-trees**: any key can carry a nested tree, a second keyspace with
//!   its own entries and stamps.
//! - **Fingerprints**: `finger` returns a shallow [`Print`] of one node for
//!   divergence detection.

pub mod nibble;
pub(crate) mod node;
pub mod operation;
pub mod print;
pub mod safe;
pub mod tree;

pub use nibble::{Nibble, rip, stitch};
pub use operation::{Operation, OperationLog};
pub use print::{Print, SubPrint};
pub use safe::SafeTree;
pub use tree::{Entry, Stamp, Tree};
