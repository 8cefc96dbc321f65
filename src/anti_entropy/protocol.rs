use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::tree::Nibble;

pub const ENDPOINT_HASH: &str = "/rpc/HashTree/Hash";
pub const ENDPOINT_FINGER: &str = "/rpc/HashTree/Finger";
pub const ENDPOINT_GET_TIMESTAMP: &str = "/rpc/HashTree/GetTimestamp";
pub const ENDPOINT_PUT_TIMESTAMP: &str = "/rpc/HashTree/PutTimestamp";
pub const ENDPOINT_DEL_TIMESTAMP: &str = "/rpc/HashTree/DelTimestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRequest {
    pub scope: Option<Vec<u8>>,
    pub key: Vec<Nibble>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutTimestampRequest {
    pub scope: Option<Vec<u8>>,
    pub key: Vec<Nibble>,
    pub value: Option<Vec<u8>>,
    pub expected: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelTimestampRequest {
    pub scope: Option<Vec<u8>>,
    pub key: Vec<Nibble>,
    pub expected: i64,
}

/// Nibbles off the wire must each fit one radix slot.
fn check_nibbles(key: &[Nibble]) -> Result<(), StoreError> {
    match key.iter().find(|n| **n > 0xf) {
        Some(n) => Err(StoreError::invalid(format!("nibble {} out of range", n))),
        None => Ok(()),
    }
}

impl KeyRequest {
    pub fn validate(&self) -> Result<(), StoreError> {
        check_nibbles(&self.key)
    }
}

impl PutTimestampRequest {
    pub fn validate(&self) -> Result<(), StoreError> {
        check_nibbles(&self.key)
    }
}

impl DelTimestampRequest {
    pub fn validate(&self) -> Result<(), StoreError> {
        check_nibbles(&self.key)
    }
}
