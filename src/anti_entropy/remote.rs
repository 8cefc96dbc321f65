use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::hash_tree::HashTree;
use super::protocol::{
    DelTimestampRequest, ENDPOINT_DEL_TIMESTAMP, ENDPOINT_FINGER, ENDPOINT_GET_TIMESTAMP,
    ENDPOINT_HASH, ENDPOINT_PUT_TIMESTAMP, KeyRequest, PutTimestampRequest,
};
use crate::hash::Digest;
use crate::tree::{Nibble, Print, Stamp};
use crate::transport::Switchboard;

/// The tree of another node, reached over `HashTree.*` RPCs.
pub struct RemoteHashTree {
    addr: String,
    switchboard: Arc<Switchboard>,
}

impl RemoteHashTree {
    pub fn new(addr: impl Into<String>, switchboard: Arc<Switchboard>) -> Self {
        Self {
            addr: addr.into(),
            switchboard,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn key_request(scope: Option<&[u8]>, key: &[Nibble]) -> KeyRequest {
        KeyRequest {
            scope: scope.map(<[u8]>::to_vec),
            key: key.to_vec(),
        }
    }
}

#[async_trait]
impl HashTree for RemoteHashTree {
    async fn hash(&self) -> Result<Digest> {
        self.switchboard.call(&self.addr, ENDPOINT_HASH, &()).await
    }

    async fn finger(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Print>> {
        self.switchboard
            .call(&self.addr, ENDPOINT_FINGER, &Self::key_request(scope, key))
            .await
    }

    async fn get_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble]) -> Result<Option<Stamp>> {
        self.switchboard
            .call(
                &self.addr,
                ENDPOINT_GET_TIMESTAMP,
                &Self::key_request(scope, key),
            )
            .await
    }

    async fn put_timestamp(
        &self,
        scope: Option<&[u8]>,
        key: &[Nibble],
        value: Option<Vec<u8>>,
        expected: Option<i64>,
        timestamp: i64,
    ) -> Result<bool> {
        let request = PutTimestampRequest {
            scope: scope.map(<[u8]>::to_vec),
            key: key.to_vec(),
            value,
            expected,
            timestamp,
        };
        self.switchboard
            .call(&self.addr, ENDPOINT_PUT_TIMESTAMP, &request)
            .await
    }

    async fn del_timestamp(&self, scope: Option<&[u8]>, key: &[Nibble], expected: i64) -> Result<bool> {
        let request = DelTimestampRequest {
            scope: scope.map(<[u8]>::to_vec),
            key: key.to_vec(),
            expected,
        };
        self.switchboard
            .call(&self.addr, ENDPOINT_DEL_TIMESTAMP, &request)
            .await
    }
}
