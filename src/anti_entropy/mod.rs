//! Anti-Entropy
//!
//! Reconciles two replicas by walking their Merkle fingerprints top-down and
//! copying only the entries that differ.
//!
//! ## Components
//! - **`HashTree`**: the seam both sides of a sync implement, either a local
//!   [`SafeTree`](crate::tree::SafeTree) or a [`RemoteHashTree`] on another node.
//! - **`TreeSync`**: one reconciliation pass from a source into a destination.
//! - **`handlers`/`protocol`**: the `HashTree.*` RPC surface that lets a node's
//!   tree act as the remote side of someone else's sync.

pub mod handlers;
pub mod hash_tree;
pub mod protocol;
pub mod remote;
pub mod sync;

pub use handlers::SyncMark;
pub use hash_tree::HashTree;
pub use remote::RemoteHashTree;
pub use sync::TreeSync;
