use parking_lot::RwLock;
use std::sync::Arc;

use super::operation::Operation;
use super::tree::Tree;
use crate::clock::TimeSource;
use crate::hash::Digest;

/// A [`Tree`] behind a reader-writer lock.
///
/// Closures passed to `read`/`write` run with the lock held, so compound
/// check-then-write sequences stay atomic.
#[derive(Default)]
pub struct SafeTree {
    inner: RwLock<Tree>,
}

impl SafeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zombie_lifetime(lifetime: i64, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            inner: RwLock::new(Tree::with_zombie_lifetime(lifetime, clock)),
        }
    }

    pub fn from_tree(tree: Tree) -> Self {
        Self {
            inner: RwLock::new(tree),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Independent copy of the current content.
    pub fn snapshot(&self) -> Tree {
        self.inner.read().clone()
    }

    pub fn hash(&self) -> Digest {
        self.inner.read().hash()
    }

    pub fn size(&self) -> usize {
        self.inner.read().size()
    }

    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.inner.read().get(key)
    }

    pub fn put(&self, key: &[u8], value: Vec<u8>, timestamp: i64) -> Option<(Vec<u8>, i64)> {
        self.inner.write().put(key, value, timestamp)
    }

    pub fn del(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.inner.write().del(key)
    }

    pub fn fake_del(&self, key: &[u8], timestamp: i64) -> Option<(Vec<u8>, i64)> {
        self.inner.write().fake_del(key, timestamp)
    }

    pub fn sub_get(&self, key: &[u8], sub_key: &[u8]) -> Option<(Vec<u8>, i64)> {
        self.inner.read().sub_get(key, sub_key)
    }

    pub fn sub_put(
        &self,
        key: &[u8],
        sub_key: &[u8],
        value: Vec<u8>,
        timestamp: i64,
    ) -> Option<(Vec<u8>, i64)> {
        self.inner.write().sub_put(key, sub_key, value, timestamp)
    }

    /// Replays one logged operation.
    pub fn apply(&self, operation: &Operation) {
        operation.apply(&mut self.inner.write());
    }
}
