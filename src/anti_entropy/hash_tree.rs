use anyhow::Result;
use async_trait::async_trait;

use crate::hash::Digest;
use crate::tree::{Nibble, Print, SafeTree, Stamp};

/// A tree that can take part in a sync.
///
/// `scope` selects the sub-tree stored under that outer key; `None` is the
/// top-level tree. Keys are nibble paths as they appear in [`Print`]s.
#[async_trait]
pub trait HashTree: Send + Sync {
    async fn hash(&self) -> Result<Digest>;

    async fn finger(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Print>>;

    async fn get_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Stamp>>;

    /// Conditional write; `value` None writes a tombstone.
    async fn put_timestamp(
        &self,
        scope: Option<&[u8]>,
        key: &[Nibble],
        value: Option<Vec<u8>>,
        expected: Option<i64>,
        timestamp: i64,
    ) -> Result<bool>;

    async fn del_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble], expected: i64) -> Result<bool>;
}

#[async_trait]
impl HashTree for SafeTree {
    async fn hash(&self) -> Result<Digest> {
        Ok(SafeTree::hash(self))
    }

    async fn finger(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Print>> {
        Ok(self.read(|tree| tree.scoped(scope).and_then(|t| t.finger(key))))
    }

    async fn get_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Stamp>> {
        Ok(self.read(|tree| tree.scoped(scope).and_then(|t| t.stamp_at(key))))
    }

    async fn put_timestamp(
        &self,
        scope: Option<&[u8]>,
        key: &[Nibble],
        value: Option<Vec<u8>>,
        expected: Option<i64>,
        timestamp: i64,
    ) -> Result<bool> {
        Ok(self.write(|tree| {
            tree.scoped_mut(scope, |t| t.put_at(key, value, expected, timestamp))
        }))
    }

    async fn del_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble], expected: i64) -> Result<bool> {
        Ok(self.write(|tree| {
            if tree.scoped(scope).is_none() {
                return false;
            }
            tree.scoped_mut(scope, |t| t.del_at(key, expected))
        }))
    }
}
