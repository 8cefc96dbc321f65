use std::fmt::Write;

use super::nibble::{Bounds, Nibble, common_prefix, stitch};
use super::tree::Tree;
use crate::hash::{Digest, Hasher, digest};

pub(crate) const BYTE_VALUE: u8 = 1;
pub(crate) const TREE_VALUE: u8 = 2;
const TOMBSTONE_FLAG: u8 = 4;

pub(crate) type Visitor<'a> = dyn FnMut(&[Nibble], &Node) -> bool + 'a;
pub(crate) type IndexVisitor<'a> = dyn FnMut(&[Nibble], &Node, usize) -> bool + 'a;

/// What `Node::count` counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tally {
    /// Live byte values.
    Bytes,
    /// Live byte values and keys holding a live sub-tree.
    Live,
    /// Every non-structural node, tombstones included.
    Real,
}

impl Tally {
    fn cached(self, node: &Node) -> usize {
        match self {
            Tally::Bytes => node.byte_size,
            Tally::Live => node.byte_size + node.tree_size,
            Tally::Real => node.real_size,
        }
    }

    /// This node's own share of `cached`.
    fn own(self, node: &Node) -> usize {
        match self {
            Tally::Bytes => usize::from(node.has_value()),
            Tally::Live => usize::from(node.has_value()) + usize::from(node.used & TREE_VALUE != 0),
            Tally::Real => usize::from(!node.is_structural()),
        }
    }
}

/// One radix node. `segment` is the part of the key path below the parent.
///
/// A node with neither a live value, a tombstone nor sub-tree content is
/// structural: it only exists to fan out to two or more children.
#[derive(Clone, Default)]
pub(crate) struct Node {
    pub segment: Vec<Nibble>,
    pub value: Vec<u8>,
    pub value_hash: Digest,
    pub timestamp: i64,
    pub tombstone: bool,
    pub tree: Option<Box<Tree>>,
    pub used: u8,
    pub hash: Digest,
    pub byte_size: usize,
    pub tree_size: usize,
    pub real_size: usize,
    pub children: [Option<Box<Node>>; 16],
}

impl Node {
    pub fn with_segment(segment: Vec<Nibble>) -> Self {
        Self {
            segment,
            ..Default::default()
        }
    }

    pub fn has_value(&self) -> bool {
        self.used & BYTE_VALUE != 0
    }

    pub fn has_tree(&self) -> bool {
        self.tree.as_ref().is_some_and(|t| t.real_size() > 0)
    }

    /// Carries a live value or a delete marker.
    pub fn has_entry(&self) -> bool {
        self.has_value() || self.tombstone
    }

    pub fn is_structural(&self) -> bool {
        !self.has_entry() && !self.has_tree()
    }

    pub fn entry(&self) -> Option<(Vec<u8>, i64)> {
        self.has_value()
            .then(|| (self.value.clone(), self.timestamp))
    }

    fn take_value(&mut self) -> Option<(Vec<u8>, i64)> {
        if !self.has_value() {
            return None;
        }
        self.used &= !BYTE_VALUE;
        self.value_hash = Digest::default();
        Some((std::mem::take(&mut self.value), self.timestamp))
    }

    pub fn set_value(&mut self, value: Vec<u8>, timestamp: i64) -> Option<(Vec<u8>, i64)> {
        let old = self.take_value();
        self.value_hash = digest(&value);
        self.value = value;
        self.timestamp = timestamp;
        self.tombstone = false;
        self.used |= BYTE_VALUE;
        old
    }

    pub fn set_tombstone(&mut self, timestamp: i64) -> Option<(Vec<u8>, i64)> {
        let old = self.take_value();
        self.tombstone = true;
        self.timestamp = timestamp;
        old
    }

    /// Forgets value and tombstone alike; the sub-tree is left alone.
    pub fn clear(&mut self) -> Option<(Vec<u8>, i64)> {
        let old = self.take_value();
        self.tombstone = false;
        self.timestamp = 0;
        old
    }

    pub fn child_count(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }

    pub fn find(&self, key: &[Nibble]) -> Option<&Node> {
        if key.is_empty() {
            return Some(self);
        }
        let child = self.children.get(key[0] as usize)?.as_deref()?;
        key.strip_prefix(child.segment.as_slice())
            .and_then(|rest| child.find(rest))
    }

    /// Runs `f` on the node at `rest` below this one, creating the path when
    /// missing, then rehashes every node on the way back up.
    pub fn update<R>(
        &mut self,
        rest: &[Nibble],
        horizon: Option<i64>,
        f: impl FnOnce(&mut Node) -> R,
    ) -> R {
        let result = if rest.is_empty() {
            f(self)
        } else {
            let slot = rest[0] as usize;
            let mut child = match self.children[slot].take() {
                None => Box::new(Node::with_segment(rest.to_vec())),
                Some(mut child) => {
                    let common = common_prefix(&child.segment, rest);
                    if common < child.segment.len() {
                        let mut middle = Node::with_segment(child.segment[..common].to_vec());
                        child.segment.drain(..common);
                        child.rehash(horizon);
                        let at = child.segment[0] as usize;
                        middle.children[at] = Some(child);
                        Box::new(middle)
                    } else {
                        child
                    }
                }
            };
            let consumed = child.segment.len();
            let result = child.update(&rest[consumed..], horizon, f);
            self.children[slot] = Some(child);
            result
        };
        self.rehash(horizon);
        result
    }

    /// Recomputes hash and counts from this node's own state and its
    /// children's cached values. Expired tombstones and dead structural
    /// children are dropped on the way.
    pub fn rehash(&mut self, horizon: Option<i64>) {
        if self.tombstone && horizon.is_some_and(|h| self.timestamp < h) {
            self.tombstone = false;
            self.timestamp = 0;
        }
        if self.tree.as_ref().is_some_and(|t| t.real_size() == 0) {
            self.tree = None;
        }
        if self.tree.as_ref().is_some_and(|t| t.size() > 0) {
            self.used |= TREE_VALUE;
        } else {
            self.used &= !TREE_VALUE;
        }

        for slot in self.children.iter_mut() {
            *slot = slot.take().and_then(|child| compact(child, horizon));
        }

        self.byte_size = usize::from(self.has_value());
        self.tree_size = usize::from(self.used & TREE_VALUE != 0);
        self.real_size = usize::from(!self.is_structural());

        let mut hasher = Hasher::new();
        let flags = self.used | if self.tombstone { TOMBSTONE_FLAG } else { 0 };
        hasher.update(&self.segment).update(&[flags]);
        if self.has_value() {
            hasher.update(&self.value_hash);
        }
        if let Some(tree) = &self.tree {
            hasher.update(&tree.hash());
        }
        for (i, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                hasher.update(&[i as u8]).update(&child.hash);
                self.byte_size += child.byte_size;
                self.tree_size += child.tree_size;
                self.real_size += child.real_size;
            }
        }
        self.hash = hasher.finish();
    }

    /// In-order walk over live byte values inside `bounds`. Returns false once
    /// the visitor asks to stop.
    pub fn walk(
        &self,
        prefix: &mut Vec<Nibble>,
        bounds: &Bounds,
        reverse: bool,
        f: &mut Visitor<'_>,
    ) -> bool {
        let mark = prefix.len();
        prefix.extend_from_slice(&self.segment);
        let go = self.byte_size == 0
            || bounds.excludes_subtree(prefix)
            || self.walk_inner(prefix, bounds, reverse, f);
        prefix.truncate(mark);
        go
    }

    fn walk_inner(
        &self,
        prefix: &mut Vec<Nibble>,
        bounds: &Bounds,
        reverse: bool,
        f: &mut Visitor<'_>,
    ) -> bool {
        let own = self.has_value() && bounds.contains(prefix);
        if !reverse && own && !f(prefix, self) {
            return false;
        }
        if reverse {
            for child in self.children.iter().rev().flatten() {
                if !child.walk(prefix, bounds, reverse, f) {
                    return false;
                }
            }
        } else {
            for child in self.children.iter().flatten() {
                if !child.walk(prefix, bounds, reverse, f) {
                    return false;
                }
            }
        }
        !(reverse && own && !f(prefix, self))
    }

    /// Walk by ordinal position among live byte values; `count` is the
    /// number of values already passed.
    pub fn walk_index(
        &self,
        prefix: &mut Vec<Nibble>,
        count: &mut usize,
        range: (Option<usize>, Option<usize>),
        reverse: bool,
        f: &mut IndexVisitor<'_>,
    ) -> bool {
        let (min, max) = range;
        if max.is_some_and(|m| *count > m) {
            return false;
        }
        if min.is_some_and(|m| *count + self.byte_size <= m) {
            *count += self.byte_size;
            return true;
        }

        let mark = prefix.len();
        prefix.extend_from_slice(&self.segment);
        let mut go = true;
        if !reverse {
            go = self.visit_index(prefix, count, range, f);
        }
        if go {
            let mut visit = |child: &Node| child.walk_index(prefix, count, range, reverse, f);
            go = if reverse {
                self.children.iter().rev().flatten().all(|c| visit(c))
            } else {
                self.children.iter().flatten().all(|c| visit(c))
            };
        }
        if go && reverse {
            go = self.visit_index(prefix, count, range, f);
        }
        prefix.truncate(mark);
        go
    }

    fn visit_index(
        &self,
        prefix: &[Nibble],
        count: &mut usize,
        (min, max): (Option<usize>, Option<usize>),
        f: &mut IndexVisitor<'_>,
    ) -> bool {
        if !self.has_value() {
            return true;
        }
        let index = *count;
        *count += 1;
        let inside = min.is_none_or(|m| index >= m) && max.is_none_or(|m| index <= m);
        !inside || f(prefix, self, index)
    }

    /// Entries of kind `tally` inside `bounds`, using cached counts for
    /// subtrees that lie wholly inside.
    pub fn count(&self, prefix: &mut Vec<Nibble>, bounds: &Bounds, tally: Tally) -> usize {
        let mark = prefix.len();
        prefix.extend_from_slice(&self.segment);
        let cached = tally.cached(self);
        let n = if cached == 0 || bounds.excludes_subtree(prefix) {
            0
        } else if bounds.covers_subtree(prefix) {
            cached
        } else {
            let own = if bounds.contains(prefix) { tally.own(self) } else { 0 };
            own + self
                .children
                .iter()
                .flatten()
                .map(|c| c.count(prefix, bounds, tally))
                .sum::<usize>()
        };
        prefix.truncate(mark);
        n
    }

    pub fn describe(&self, indent: usize, prefix: &mut Vec<Nibble>, out: &mut String) {
        let mark = prefix.len();
        prefix.extend_from_slice(&self.segment);
        let _ = write!(
            out,
            "{:indent$}{:?} segment={:?}",
            "",
            stitch(prefix),
            self.segment,
            indent = indent
        );
        if self.has_value() {
            let _ = write!(out, " value={:?}@{}", self.value, self.timestamp);
        }
        if self.tombstone {
            let _ = write!(out, " tombstone@{}", self.timestamp);
        }
        let _ = writeln!(out, " size={}/{}", self.byte_size, self.real_size);
        if let Some(tree) = &self.tree {
            let _ = writeln!(out, "{:indent$}sub-tree:", "", indent = indent + 2);
            tree.root.describe(indent + 4, &mut Vec::new(), out);
        }
        for child in self.children.iter().flatten() {
            child.describe(indent + 2, prefix, out);
        }
        prefix.truncate(mark);
    }
}

/// Removes a structural child with no children and folds a structural child
/// with exactly one child into that child.
fn compact(mut child: Box<Node>, horizon: Option<i64>) -> Option<Box<Node>> {
    if !child.is_structural() {
        return Some(child);
    }
    match child.child_count() {
        0 => None,
        1 => {
            let mut only = child.children.iter_mut().find_map(|c| c.take())?;
            let mut segment = std::mem::take(&mut child.segment);
            segment.extend_from_slice(&only.segment);
            only.segment = segment;
            only.rehash(horizon);
            Some(only)
        }
        _ => Some(child),
    }
}
