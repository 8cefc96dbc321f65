//! Consistent Hashing Ring
//!
//! Replaces modulo partitioning with ring arcs: every member owns the keys
//! whose coordinate falls between its predecessor (exclusive) and itself
//! (inclusive).
//!
//! ## Core Mechanisms
//! - **Flat ordered sequence**: members are kept sorted by `(position, address)`
//!   in a single `Vec`; wrap-around is index arithmetic, never pointers.
//! - **Single lookup primitive**: `Ring::remotes` answers predecessor, exact
//!   match and successor in one binary search.
//! - **Gap-based placement**: joining nodes take the midpoint of the widest arc.

pub mod ring;
pub mod types;

pub use ring::Ring;
pub use types::Remote;

#[cfg(test)]
mod tests;
