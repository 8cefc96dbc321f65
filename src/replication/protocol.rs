use serde::{Deserialize, Serialize};

use super::types::Range;
use crate::tree::Entry;

/// Routed write; the receiver re-resolves the owner and forwards again if it
/// does not own the key.
pub const ENDPOINT_WRITE: &str = "/rpc/DHash/Write";
/// Replica write from the previous node in the chain, applied as is.
pub const ENDPOINT_SLAVE_WRITE: &str = "/rpc/DHash/SlaveWrite";
/// Read answered from the receiver's own tree.
pub const ENDPOINT_READ: &str = "/rpc/DHash/Read";
pub const ENDPOINT_DESCRIBE: &str = "/rpc/DHash/Describe";
/// Values in the arc the receiver owns; what migration balances.
pub const ENDPOINT_LOAD: &str = "/rpc/DHash/Load";
/// Position of the receiver's `i`-th owned value, counted from the start of
/// its arc.
pub const ENDPOINT_POSITION_AT: &str = "/rpc/DHash/PositionAt";

/// Every read names the top-level key it is about; ordered reads work on the
/// sub-tree stored under that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadRequest {
    Get { key: Vec<u8> },
    SubGet { key: Vec<u8>, sub_key: Vec<u8> },
    Slice { key: Vec<u8>, range: Range },
    ReverseSlice { key: Vec<u8>, range: Range },
    SliceIndex { key: Vec<u8>, min: Option<usize>, max: Option<usize> },
    ReverseSliceIndex { key: Vec<u8>, min: Option<usize>, max: Option<usize> },
    SliceLen { key: Vec<u8>, min: Option<Vec<u8>>, min_inc: bool, len: usize },
    IndexOf { key: Vec<u8>, sub_key: Vec<u8> },
    ReverseIndexOf { key: Vec<u8>, sub_key: Vec<u8> },
    Count { key: Vec<u8>, range: Range },
    SubSize { key: Vec<u8> },
    First { key: Vec<u8> },
    Last { key: Vec<u8> },
    Next { key: Vec<u8>, sub_key: Vec<u8> },
    Prev { key: Vec<u8>, sub_key: Vec<u8> },
}

impl ReadRequest {
    pub fn key(&self) -> &[u8] {
        match self {
            ReadRequest::Get { key }
            | ReadRequest::SubGet { key, .. }
            | ReadRequest::Slice { key, .. }
            | ReadRequest::ReverseSlice { key, .. }
            | ReadRequest::SliceIndex { key, .. }
            | ReadRequest::ReverseSliceIndex { key, .. }
            | ReadRequest::SliceLen { key, .. }
            | ReadRequest::IndexOf { key, .. }
            | ReadRequest::ReverseIndexOf { key, .. }
            | ReadRequest::Count { key, .. }
            | ReadRequest::SubSize { key }
            | ReadRequest::First { key }
            | ReadRequest::Last { key }
            | ReadRequest::Next { key, .. }
            | ReadRequest::Prev { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadResponse {
    /// Value and timestamp of a live entry.
    Value(Option<(Vec<u8>, i64)>),
    Entries(Vec<Entry>),
    Entry(Option<Entry>),
    Index { index: usize, existed: bool },
    Count(usize),
}
