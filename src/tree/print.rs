use serde::{Deserialize, Serialize};

use super::nibble::Nibble;
use super::node::Node;
use crate::hash::Digest;

/// Summary of one child slot: the child's full key path and subtree hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPrint {
    pub key: Vec<Nibble>,
    pub sum: Digest,
}

/// Shallow fingerprint of a single node.
///
/// Carries hashes and stamps only, never values. A missing node is `None`
/// at the call site, which keeps "absent" apart from a tombstone stamped 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Print {
    pub key: Vec<Nibble>,
    /// No live value, no tombstone and no sub-tree content.
    pub empty: bool,
    pub tombstone: bool,
    pub timestamp: i64,
    /// Hash of the live byte value.
    pub value_hash: Option<Digest>,
    pub sub_tree: bool,
    pub tree_hash: Digest,
    pub sub_prints: Vec<Option<SubPrint>>,
}

impl Print {
    pub(crate) fn of(key: &[Nibble], node: &Node) -> Self {
        let sub_prints = node
            .children
            .iter()
            .map(|child| {
                child.as_ref().map(|c| {
                    let mut child_key = key.to_vec();
                    child_key.extend_from_slice(&c.segment);
                    SubPrint {
                        key: child_key,
                        sum: c.hash,
                    }
                })
            })
            .collect();
        Self {
            key: key.to_vec(),
            empty: node.is_structural(),
            tombstone: node.tombstone,
            timestamp: node.timestamp,
            value_hash: node.has_value().then_some(node.value_hash),
            sub_tree: node.has_tree(),
            tree_hash: node.tree.as_ref().map(|t| t.hash()).unwrap_or_default(),
            sub_prints,
        }
    }

    /// A value or a tombstone lives at this exact key.
    pub fn has_entry(&self) -> bool {
        self.value_hash.is_some() || self.tombstone
    }

    pub fn child(&self, slot: usize) -> Option<&SubPrint> {
        self.sub_prints.get(slot).and_then(|c| c.as_ref())
    }

    /// Whether this entry should overwrite `other`'s under last-writer-wins.
    ///
    /// Higher timestamp wins; equal timestamps fall back to comparing value
    /// hashes (a tombstone sorts below any value) so both directions agree.
    pub fn supersedes(&self, other: Option<&Print>) -> bool {
        if !self.has_entry() {
            return false;
        }
        let Some(other) = other.filter(|o| o.has_entry()) else {
            return true;
        };
        match self.timestamp.cmp(&other.timestamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.value_hash > other.value_hash,
        }
    }
}
