use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::hash::Digest;
use crate::ring::Remote;

/// A write as it travels between nodes.
///
/// `ttl` bounds how many more replicas the write is pushed to and `sync`
/// makes every hop wait for the next one before answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: Vec<u8>,
    pub sub_key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub exists: bool,
    pub timestamp: i64,
    pub ttl: usize,
    pub sync: bool,
}

impl Item {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            sub_key: None,
            value: Vec::new(),
            exists: false,
            timestamp: 0,
            ttl: 0,
            sync: false,
        }
    }

    pub fn with_sub_key(mut self, sub_key: &[u8]) -> Self {
        self.sub_key = Some(sub_key.to_vec());
        self
    }

    pub fn with_value(mut self, value: &[u8]) -> Self {
        self.value = value.to_vec();
        self.exists = true;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.sync = true;
        self
    }

    /// The tree payload: the value, or None for a tombstone.
    pub fn payload(&self) -> Option<Vec<u8>> {
        self.exists.then(|| self.value.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    Put,
    Del,
    SubPut,
    SubDel,
    SubClear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub kind: WriteKind,
    pub item: Item,
}

impl WriteRequest {
    pub fn put(key: &[u8], value: &[u8]) -> Self {
        Self {
            kind: WriteKind::Put,
            item: Item::new(key).with_value(value),
        }
    }

    pub fn del(key: &[u8]) -> Self {
        Self {
            kind: WriteKind::Del,
            item: Item::new(key),
        }
    }

    pub fn sub_put(key: &[u8], sub_key: &[u8], value: &[u8]) -> Self {
        Self {
            kind: WriteKind::SubPut,
            item: Item::new(key).with_sub_key(sub_key).with_value(value),
        }
    }

    pub fn sub_del(key: &[u8], sub_key: &[u8]) -> Self {
        Self {
            kind: WriteKind::SubDel,
            item: Item::new(key).with_sub_key(sub_key),
        }
    }

    pub fn sub_clear(key: &[u8]) -> Self {
        Self {
            kind: WriteKind::SubClear,
            item: Item::new(key),
        }
    }

    pub fn synchronous(mut self) -> Self {
        self.item.sync = true;
        self
    }

    /// Rejects requests whose fields do not fit their kind.
    pub fn validate(&self) -> Result<(), StoreError> {
        let item = &self.item;
        if item.key.is_empty() {
            return Err(StoreError::invalid("empty key"));
        }
        let wants_sub_key = matches!(self.kind, WriteKind::SubPut | WriteKind::SubDel);
        if wants_sub_key != item.sub_key.is_some() {
            return Err(StoreError::invalid(format!(
                "{:?} {} a sub key",
                self.kind,
                if wants_sub_key { "needs" } else { "takes no" }
            )));
        }
        let wants_value = matches!(self.kind, WriteKind::Put | WriteKind::SubPut);
        if wants_value != item.exists {
            return Err(StoreError::invalid(format!(
                "{:?} with exists={}",
                self.kind, item.exists
            )));
        }
        Ok(())
    }
}

/// Key bounds for a slice over a sub-tree. Unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<Vec<u8>>,
    pub max: Option<Vec<u8>>,
    pub min_inc: bool,
    pub max_inc: bool,
}

impl Range {
    pub fn all() -> Self {
        Self {
            min_inc: true,
            max_inc: true,
            ..Default::default()
        }
    }

    pub fn between(min: &[u8], max: &[u8], min_inc: bool, max_inc: bool) -> Self {
        Self {
            min: Some(min.to_vec()),
            max: Some(max.to_vec()),
            min_inc,
            max_inc,
        }
    }
}

/// Snapshot of one node's share of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub remote: Remote,
    pub predecessor: Option<Remote>,
    pub ring: Vec<Remote>,
    pub redundancy: usize,
    /// Live keys in the arc this node owns.
    pub owned: usize,
    /// Live keys stored here, replicas included.
    pub held: usize,
    pub tree_hash: Digest,
}
