use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::nibble::{Bounds, Nibble, rip, stitch};
use super::node::{Node, Tally};
use super::print::Print;
use crate::clock::TimeSource;
use crate::hash::Digest;

/// `(key, value, timestamp)` of a live byte value.
pub type Entry = (Vec<u8>, Vec<u8>, i64);

/// What sits at one exact key: a value, or a tombstone when `value` is None.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
}

/// Tombstone retention: markers stamped before `clock.actual_time() -
/// lifetime` are pruned. The clock must be the one that stamps writes.
#[derive(Clone)]
struct Zombies {
    lifetime: i64,
    clock: Arc<dyn TimeSource>,
}

/// Versioned radix tree with a Merkle hash over its whole content.
///
/// Not synchronized; wrap it in a [`SafeTree`](super::SafeTree) to share it.
#[derive(Clone)]
pub struct Tree {
    pub(crate) root: Node,
    zombies: Option<Zombies>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree that keeps tombstones forever.
    pub fn new() -> Self {
        Self::with_zombies(None)
    }

    /// Tombstones more than `lifetime` older than `clock` are pruned whenever
    /// a write passes over them. Stamps and `lifetime` share `clock`'s unit.
    pub fn with_zombie_lifetime(lifetime: i64, clock: Arc<dyn TimeSource>) -> Self {
        Self::with_zombies(Some(Zombies { lifetime, clock }))
    }

    fn with_zombies(zombies: Option<Zombies>) -> Self {
        let mut root = Node::default();
        root.rehash(None);
        Self { root, zombies }
    }

    fn horizon(&self) -> Option<i64> {
        self.zombies
            .as_ref()
            .map(|z| z.clock.actual_time().saturating_sub(z.lifetime))
    }

    fn update<R>(&mut self, key: &[Nibble], f: impl FnOnce(&mut Node) -> R) -> R {
        let horizon = self.horizon();
        self.root.update(key, horizon, f)
    }

    pub fn hash(&self) -> Digest {
        self.root.hash
    }

    /// Live byte values plus keys holding a live sub-tree.
    pub fn size(&self) -> usize {
        self.root.byte_size + self.root.tree_size
    }

    /// Every non-structural node, tombstones included.
    pub fn real_size(&self) -> usize {
        self.root.real_size
    }

    pub fn is_empty(&self) -> bool {
        self.root.real_size == 0
    }

    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.root.find(&rip(key)).and_then(Node::entry)
    }

    /// Like `get`, but also reports tombstones.
    pub fn get_timestamp(&self, key: &[u8]) -> Option<Stamp> {
        self.stamp_at(&rip(key))
    }

    /// Unconditional write. Returns the previous live value.
    pub fn put(&mut self, key: &[u8], value: Vec<u8>, timestamp: i64) -> Option<(Vec<u8>, i64)> {
        self.update(&rip(key), |node| node.set_value(value, timestamp))
    }

    /// Physically removes the value or tombstone at `key`.
    pub fn del(&mut self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let key = rip(key);
        self.root.find(&key)?;
        self.update(&key, Node::clear)
    }

    /// Replaces whatever is at `key` with a tombstone stamped `timestamp`.
    pub fn fake_del(&mut self, key: &[u8], timestamp: i64) -> Option<(Vec<u8>, i64)> {
        self.update(&rip(key), |node| node.set_tombstone(timestamp))
    }

    /// Writes only if the current stamp at `key` is `expected` (`None` meaning
    /// nothing is there).
    pub fn put_timestamp(
        &mut self,
        key: &[u8],
        value: Option<Vec<u8>>,
        expected: Option<i64>,
        timestamp: i64,
    ) -> bool {
        self.put_at(&rip(key), value, expected, timestamp)
    }

    pub fn del_timestamp(&mut self, key: &[u8], expected: i64) -> bool {
        self.del_at(&rip(key), expected)
    }

    /// Last-writer-wins write: applied only over an older stamp or nothing.
    pub fn write_if_newer(&mut self, key: &[u8], value: Option<Vec<u8>>, timestamp: i64) -> bool {
        let key = rip(key);
        if self
            .stamp_at(&key)
            .is_some_and(|current| current.timestamp >= timestamp)
        {
            return false;
        }
        self.write_at(&key, value, timestamp);
        true
    }

    // nibble addressed access, used by anti-entropy

    pub fn finger(&self, key: &[Nibble]) -> Option<Print> {
        self.root.find(key).map(|node| Print::of(key, node))
    }

    pub fn stamp_at(&self, key: &[Nibble]) -> Option<Stamp> {
        self.root
            .find(key)
            .filter(|node| node.has_entry())
            .map(|node| Stamp {
                value: node.has_value().then(|| node.value.clone()),
                timestamp: node.timestamp,
            })
    }

    pub fn put_at(
        &mut self,
        key: &[Nibble],
        value: Option<Vec<u8>>,
        expected: Option<i64>,
        timestamp: i64,
    ) -> bool {
        if self.stamp_at(key).map(|s| s.timestamp) != expected {
            return false;
        }
        self.write_at(key, value, timestamp);
        true
    }

    pub fn del_at(&mut self, key: &[Nibble], expected: i64) -> bool {
        if self.stamp_at(key).map(|s| s.timestamp) != Some(expected) {
            return false;
        }
        self.update(key, Node::clear);
        true
    }

    fn write_at(&mut self, key: &[Nibble], value: Option<Vec<u8>>, timestamp: i64) {
        self.update(key, |node| match value {
            Some(value) => node.set_value(value, timestamp),
            None => node.set_tombstone(timestamp),
        });
    }

    // sub-trees

    pub fn sub_tree(&self, key: &[u8]) -> Option<&Tree> {
        self.root.find(&rip(key)).and_then(|node| node.tree.as_deref())
    }

    fn sub_update<R>(&mut self, key: &[u8], f: impl FnOnce(&mut Tree) -> R) -> R {
        let zombies = self.zombies.clone();
        self.update(&rip(key), |node| {
            let tree = node
                .tree
                .get_or_insert_with(|| Box::new(Tree::with_zombies(zombies)));
            f(tree)
        })
    }

    /// The tree itself for `None`, the sub-tree under the key otherwise.
    pub fn scoped(&self, scope: Option<&[u8]>) -> Option<&Tree> {
        match scope {
            None => Some(self),
            Some(key) => self.sub_tree(key),
        }
    }

    /// Mutable counterpart of `scoped`; creates the sub-tree if missing.
    pub fn scoped_mut<R>(&mut self, scope: Option<&[u8]>, f: impl FnOnce(&mut Tree) -> R) -> R {
        match scope {
            None => f(self),
            Some(key) => self.sub_update(key, f),
        }
    }

    pub fn sub_get(&self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.sub_tree(key)?.get(sub_key)
    }

    pub fn sub_put(
        &mut self,
        key: &[u8],
        sub_key: &[u8],
        value: Vec<u8>,
        timestamp: i64,
    ) -> Option<(Vec<u8>, i64)> {
        self.sub_update(key, |tree| tree.put(sub_key, value, timestamp))
    }

    pub fn sub_del(&mut self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.sub_tree(key)?;
        self.sub_update(key, |tree| tree.del(sub_key))
    }

    pub fn sub_fake_del(
        &mut self,
        key: &[u8],
        sub_key: &[u8],
        timestamp: i64,
    ) -> Option<(Vec<u8>, i64)> {
        self.sub_update(key, |tree| tree.fake_del(sub_key, timestamp))
    }

    /// Tombstones every live entry of the sub-tree. Returns how many.
    pub fn sub_clear(&mut self, key: &[u8], timestamp: i64) -> usize {
        let Some(sub) = self.sub_tree(key) else {
            return 0;
        };
        let mut keys = Vec::new();
        sub.each(|k, _, _| {
            keys.push(k.to_vec());
            true
        });
        self.sub_update(key, |tree| {
            for k in &keys {
                tree.fake_del(k, timestamp);
            }
        });
        keys.len()
    }

    pub fn sub_size(&self, key: &[u8]) -> usize {
        self.sub_tree(key).map_or(0, Tree::size)
    }

    pub fn sub_finger(&self, key: &[u8], sub_key: &[Nibble]) -> Option<Print> {
        self.sub_tree(key)?.finger(sub_key)
    }

    pub fn sub_size_between(
        &self,
        key: &[u8],
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.sub_tree(key)
            .map_or(0, |tree| tree.size_between(min, max, min_inc, max_inc))
    }

    // ordered traversal over live byte values

    pub fn each(&self, f: impl FnMut(&[u8], &[u8], i64) -> bool) {
        self.each_between(None, None, true, true, f)
    }

    pub fn each_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        f: impl FnMut(&[u8], &[u8], i64) -> bool,
    ) {
        self.walk(Bounds::new(min, max, min_inc, max_inc), false, f)
    }

    pub fn reverse_each_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
        f: impl FnMut(&[u8], &[u8], i64) -> bool,
    ) {
        self.walk(Bounds::new(min, max, min_inc, max_inc), true, f)
    }

    fn walk(&self, bounds: Bounds, reverse: bool, mut f: impl FnMut(&[u8], &[u8], i64) -> bool) {
        self.root.walk(
            &mut Vec::new(),
            &bounds,
            reverse,
            &mut |key: &[Nibble], node: &Node| f(&stitch(key), &node.value, node.timestamp),
        );
    }

    /// Visits values whose ordinal lies in `[min, max]`, both inclusive.
    pub fn each_between_index(
        &self,
        min: Option<usize>,
        max: Option<usize>,
        f: impl FnMut(&[u8], &[u8], i64, usize) -> bool,
    ) {
        self.walk_index(min, max, false, f)
    }

    /// Ordinals count from the last key backwards.
    pub fn reverse_each_between_index(
        &self,
        min: Option<usize>,
        max: Option<usize>,
        f: impl FnMut(&[u8], &[u8], i64, usize) -> bool,
    ) {
        self.walk_index(min, max, true, f)
    }

    fn walk_index(
        &self,
        min: Option<usize>,
        max: Option<usize>,
        reverse: bool,
        mut f: impl FnMut(&[u8], &[u8], i64, usize) -> bool,
    ) {
        self.root.walk_index(
            &mut Vec::new(),
            &mut 0,
            (min, max),
            reverse,
            &mut |key: &[Nibble], node: &Node, index: usize| {
                f(&stitch(key), &node.value, node.timestamp, index)
            },
        );
    }

    pub fn size_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.root
            .count(&mut Vec::new(), &Bounds::new(min, max, min_inc, max_inc), Tally::Bytes)
    }

    /// Keys inside the bounds holding a live value or a live sub-tree; the
    /// ranged counterpart of `size`.
    pub fn live_size_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.root
            .count(&mut Vec::new(), &Bounds::new(min, max, min_inc, max_inc), Tally::Live)
    }

    /// Every entry inside the bounds, tombstones and sub-tree holders
    /// included; the ranged counterpart of `real_size`.
    pub fn real_size_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        min_inc: bool,
        max_inc: bool,
    ) -> usize {
        self.root
            .count(&mut Vec::new(), &Bounds::new(min, max, min_inc, max_inc), Tally::Real)
    }

    /// Number of live keys below `key`, and whether `key` itself is live.
    pub fn index_of(&self, key: &[u8]) -> (usize, bool) {
        (
            self.size_between(None, Some(key), true, false),
            self.get(key).is_some(),
        )
    }

    /// Number of live keys above `key`, and whether `key` itself is live.
    pub fn reverse_index_of(&self, key: &[u8]) -> (usize, bool) {
        (
            self.size_between(Some(key), None, false, true),
            self.get(key).is_some(),
        )
    }

    fn first_between(&self, bounds: Bounds, reverse: bool) -> Option<Entry> {
        let mut found = None;
        self.walk(bounds, reverse, |k, v, t| {
            found = Some((k.to_vec(), v.to_vec(), t));
            false
        });
        found
    }

    pub fn first(&self) -> Option<Entry> {
        self.first_between(Bounds::default(), false)
    }

    pub fn last(&self) -> Option<Entry> {
        self.first_between(Bounds::default(), true)
    }

    /// The first live entry strictly after `key`.
    pub fn next(&self, key: &[u8]) -> Option<Entry> {
        self.first_between(Bounds::new(Some(key), None, false, true), false)
    }

    /// The last live entry strictly before `key`.
    pub fn prev(&self, key: &[u8]) -> Option<Entry> {
        self.first_between(Bounds::new(None, Some(key), true, false), true)
    }

    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.root.describe(0, &mut Vec::new(), &mut out);
        out
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
