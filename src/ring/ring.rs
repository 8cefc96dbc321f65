use parking_lot::RwLock;
use std::collections::HashSet;

use super::types::Remote;
use crate::hash::{Digest, Hasher, Position};

/// Ordered, address-unique set of known members.
///
/// Every read and write goes through the internal lock, so a `Ring` can be
/// shared between request handlers and the background loops directly.
pub struct Ring {
    nodes: RwLock<Vec<Remote>>,
    redundancy: usize,
}

/// `(before, at, after)` indices around a coordinate, for a non-empty slice.
///
/// `before` is the last member strictly below the search point (wrapping),
/// `at` the first member exactly on it and `after` the first member strictly
/// above it (wrapping).
fn indices(nodes: &[Remote], pos: &Position) -> (usize, Option<usize>, usize) {
    let len = nodes.len();
    let i = nodes.partition_point(|r| r.pos < *pos);
    if i == len {
        return (len - 1, None, 0);
    }

    let before = if i == 0 { len - 1 } else { i - 1 };
    if nodes[i].pos == *pos {
        let after = nodes.partition_point(|r| r.pos <= *pos);
        (before, Some(i), if after == len { 0 } else { after })
    } else {
        (before, None, i)
    }
}

impl Ring {
    pub fn new(redundancy: usize) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            redundancy,
        }
    }

    pub fn with_nodes(redundancy: usize, nodes: Vec<Remote>) -> Self {
        let ring = Self::new(redundancy);
        ring.set_nodes(nodes);
        ring
    }

    /// Snapshot of the members in ring order.
    pub fn nodes(&self) -> Vec<Remote> {
        self.nodes.read().clone()
    }

    /// Replaces the whole membership, restoring ordering and address uniqueness.
    pub fn set_nodes(&self, nodes: Vec<Remote>) {
        let mut sorted: Vec<Remote> = Vec::with_capacity(nodes.len());
        for remote in nodes {
            insert(&mut sorted, remote);
        }
        *self.nodes.write() = sorted;
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.nodes.read().iter().any(|r| r.addr == addr)
    }

    /// Inserts `remote`, replacing any entry with the same address.
    pub fn add(&self, remote: Remote) {
        insert(&mut self.nodes.write(), remote);
    }

    /// Removes the member with `remote`'s address.
    ///
    /// # Panics
    /// If that member is the only one left.
    pub fn remove(&self, remote: &Remote) {
        let mut nodes = self.nodes.write();
        if let Some(index) = nodes.iter().position(|r| r.addr == remote.addr) {
            if nodes.len() == 1 {
                panic!("refusing to remove {} as the last member of the ring", remote);
            }
            nodes.remove(index);
        }
    }

    /// Predecessor, exact match and successor of `pos`.
    pub fn remotes(&self, pos: &Position) -> (Option<Remote>, Option<Remote>, Option<Remote>) {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return (None, None, None);
        }
        let (before, at, after) = indices(&nodes, pos);
        (
            Some(nodes[before].clone()),
            at.map(|i| nodes[i].clone()),
            Some(nodes[after].clone()),
        )
    }

    /// The member following `remote` in `(position, address)` order, wrapping.
    pub fn successor(&self, remote: &Remote) -> Option<Remote> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return None;
        }
        let i = nodes.partition_point(|r| r <= remote);
        Some(nodes[if i == nodes.len() { 0 } else { i }].clone())
    }

    /// The member preceding `remote` in `(position, address)` order, wrapping.
    pub fn predecessor(&self, remote: &Remote) -> Option<Remote> {
        let nodes = self.nodes.read();
        if nodes.is_empty() {
            return None;
        }
        let i = nodes.partition_point(|r| r < remote);
        Some(nodes[if i == 0 { nodes.len() - 1 } else { i - 1 }].clone())
    }

    /// Number of copies each key gets: the configured factor capped by size.
    pub fn redundancy(&self) -> usize {
        self.redundancy.min(self.len())
    }

    pub fn configured_redundancy(&self) -> usize {
        self.redundancy
    }

    /// Midpoint of the widest arc between consecutive members.
    ///
    /// The arc from the last member back round to the first counts too. A
    /// single member leaves the whole circle, so its slot is diametrically
    /// opposite.
    pub fn get_slot(&self) -> Option<Position> {
        let nodes = self.nodes.read();
        let first = nodes.first()?;

        let mut widest = 0u128;
        let mut start = first.pos.as_u128();
        for (i, node) in nodes.iter().enumerate() {
            let this = node.pos.as_u128();
            let next = nodes[(i + 1) % nodes.len()].pos.as_u128();
            let gap = next.wrapping_sub(this);
            if gap > widest {
                widest = gap;
                start = this;
            }
        }

        // all members share one coordinate: the gap is the full circle
        let half = if widest == 0 { 1u128 << 127 } else { widest / 2 };
        Some(Position::from_u128(start.wrapping_add(half)))
    }

    /// Drops every member strictly inside the arc `(predecessor, successor)`.
    ///
    /// When `successor` is not itself a member, the member just below it
    /// bounds the arc instead.
    pub fn clean(&self, predecessor: &Position, successor: &Position) {
        let mut nodes = self.nodes.write();
        if nodes.is_empty() {
            return;
        }
        let (_, _, from) = indices(&nodes, predecessor);
        let (before, at, _) = indices(&nodes, successor);
        let to = at.unwrap_or(before);

        if from > to {
            nodes.truncate(from);
            nodes.drain(..to);
        } else {
            nodes.drain(from..to);
        }
    }

    /// # Panics
    /// On a duplicate address or an out-of-order entry.
    pub fn validate(&self) {
        let nodes = self.nodes.read();
        let mut seen = HashSet::new();
        for (i, node) in nodes.iter().enumerate() {
            if !seen.insert(node.addr.as_str()) {
                panic!("duplicate address in ring: {}", describe(&nodes));
            }
            if i > 0 && node < &nodes[i - 1] {
                panic!("ring out of order: {}", describe(&nodes));
            }
        }
    }

    /// Digest of the full membership; equal rings have equal hashes.
    pub fn hash(&self) -> Digest {
        let nodes = self.nodes.read();
        let mut hasher = Hasher::new();
        for node in nodes.iter() {
            hasher.update(node.pos.as_bytes()).update(node.addr.as_bytes());
        }
        hasher.finish()
    }

    pub fn describe(&self) -> String {
        describe(&self.nodes.read())
    }
}

impl Clone for Ring {
    fn clone(&self) -> Self {
        Self {
            nodes: RwLock::new(self.nodes()),
            redundancy: self.redundancy,
        }
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

fn insert(nodes: &mut Vec<Remote>, remote: Remote) {
    if let Some(index) = nodes.iter().position(|r| r.addr == remote.addr) {
        if nodes[index].pos == remote.pos {
            return;
        }
        nodes.remove(index);
    }
    let i = nodes.partition_point(|r| r <= &remote);
    nodes.insert(i, remote);
}

fn describe(nodes: &[Remote]) -> String {
    let mut out = String::from("[");
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&node.to_string());
    }
    out.push(']');
    out
}
