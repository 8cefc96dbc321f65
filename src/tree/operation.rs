use serde::{Deserialize, Serialize};

use super::tree::Tree;

/// A committed write in replayable form.
///
/// Deletes replay as tombstones so a rebuilt tree still blocks stale copies
/// arriving from other replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub key: Vec<u8>,
    pub sub_key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub version: i64,
    pub put: bool,
}

impl Operation {
    pub fn put(key: &[u8], sub_key: Option<&[u8]>, value: &[u8], version: i64) -> Self {
        Self {
            key: key.to_vec(),
            sub_key: sub_key.map(<[u8]>::to_vec),
            value: value.to_vec(),
            version,
            put: true,
        }
    }

    pub fn del(key: &[u8], sub_key: Option<&[u8]>, version: i64) -> Self {
        Self {
            key: key.to_vec(),
            sub_key: sub_key.map(<[u8]>::to_vec),
            value: Vec::new(),
            version,
            put: false,
        }
    }

    pub fn apply(&self, tree: &mut Tree) {
        match (&self.sub_key, self.put) {
            (None, true) => {
                tree.put(&self.key, self.value.clone(), self.version);
            }
            (None, false) => {
                tree.fake_del(&self.key, self.version);
            }
            (Some(sub_key), true) => {
                tree.sub_put(&self.key, sub_key, self.value.clone(), self.version);
            }
            (Some(sub_key), false) => {
                tree.sub_fake_del(&self.key, sub_key, self.version);
            }
        }
    }
}

/// Receives every write committed to a node's tree, in commit order.
///
/// Durable storage of the stream is up to the implementor.
pub trait OperationLog: Send + Sync {
    fn record(&self, operation: &Operation);
}
