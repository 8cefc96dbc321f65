use axum::{Router, body::Bytes, extract::Extension, routing::post};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::hash_tree::HashTree;
use super::protocol::{
    DelTimestampRequest, ENDPOINT_DEL_TIMESTAMP, ENDPOINT_FINGER, ENDPOINT_GET_TIMESTAMP,
    ENDPOINT_HASH, ENDPOINT_PUT_TIMESTAMP, KeyRequest, PutTimestampRequest,
};
use crate::clock::wall_nanos;
use crate::tree::SafeTree;
use crate::transport::codec::failure;
use crate::transport::{RpcResponse, decode, reply};

/// Wall time in nanoseconds of the last entry another node's sync wrote into
/// the served tree; zero until one lands.
#[derive(Debug, Default)]
pub struct SyncMark(AtomicI64);

impl SyncMark {
    pub fn touch(&self) {
        self.0.store(wall_nanos(), Ordering::Relaxed);
    }

    pub fn last(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Serves `tree` as the remote side of other nodes' syncs, touching `mark`
/// whenever one of them changes it.
pub fn router(tree: Arc<SafeTree>, mark: Arc<SyncMark>) -> Router {
    Router::new()
        .route(ENDPOINT_HASH, post(handle_hash))
        .route(ENDPOINT_FINGER, post(handle_finger))
        .route(ENDPOINT_GET_TIMESTAMP, post(handle_get_timestamp))
        .route(ENDPOINT_PUT_TIMESTAMP, post(handle_put_timestamp))
        .route(ENDPOINT_DEL_TIMESTAMP, post(handle_del_timestamp))
        .layer(Extension(tree))
        .layer(Extension(mark))
}

fn marked(mark: &SyncMark, result: anyhow::Result<bool>) -> RpcResponse {
    if let Ok(true) = result {
        mark.touch();
    }
    reply(result)
}

async fn handle_hash(Extension(tree): Extension<Arc<SafeTree>>) -> RpcResponse {
    reply(HashTree::hash(tree.as_ref()).await)
}

async fn handle_finger(Extension(tree): Extension<Arc<SafeTree>>, body: Bytes) -> RpcResponse {
    let req: KeyRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Err(e) = req.validate() {
        return failure(&e.into());
    }
    reply(tree.finger(req.scope.as_deref(), &req.key).await)
}

async fn handle_get_timestamp(
    Extension(tree): Extension<Arc<SafeTree>>,
    body: Bytes,
) -> RpcResponse {
    let req: KeyRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Err(e) = req.validate() {
        return failure(&e.into());
    }
    reply(tree.get_timestamp(req.scope.as_deref(), &req.key).await)
}

async fn handle_put_timestamp(
    Extension(tree): Extension<Arc<SafeTree>>,
    Extension(mark): Extension<Arc<SyncMark>>,
    body: Bytes,
) -> RpcResponse {
    let req: PutTimestampRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Err(e) = req.validate() {
        return failure(&e.into());
    }
    marked(
        &mark,
        tree.put_timestamp(
            req.scope.as_deref(),
            &req.key,
            req.value,
            req.expected,
            req.timestamp,
        )
        .await,
    )
}

async fn handle_del_timestamp(
    Extension(tree): Extension<Arc<SafeTree>>,
    Extension(mark): Extension<Arc<SyncMark>>,
    body: Bytes,
) -> RpcResponse {
    let req: DelTimestampRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Err(e) = req.validate() {
        return failure(&e.into());
    }
    marked(
        &mark,
        tree.del_timestamp(req.scope.as_deref(), &req.key, req.expected)
            .await,
    )
}
