use axum::{Router, body::Bytes, extract::Extension, routing::post};
use std::sync::Arc;

use super::coordinator::Coordinator;
use super::protocol::{
    ENDPOINT_DESCRIBE, ENDPOINT_LOAD, ENDPOINT_POSITION_AT, ENDPOINT_READ, ENDPOINT_SLAVE_WRITE,
    ENDPOINT_WRITE, ReadRequest,
};
use super::types::WriteRequest;
use crate::transport::{RpcResponse, decode, reply};

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route(ENDPOINT_WRITE, post(handle_write))
        .route(ENDPOINT_SLAVE_WRITE, post(handle_slave_write))
        .route(ENDPOINT_READ, post(handle_read))
        .route(ENDPOINT_DESCRIBE, post(handle_describe))
        .route(ENDPOINT_LOAD, post(handle_load))
        .route(ENDPOINT_POSITION_AT, post(handle_position_at))
        .layer(Extension(coordinator))
}

async fn handle_write(Extension(coordinator): Extension<Arc<Coordinator>>, body: Bytes) -> RpcResponse {
    let request: WriteRequest = match decode(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    reply(coordinator.write(request).await)
}

async fn handle_slave_write(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    body: Bytes,
) -> RpcResponse {
    let request: WriteRequest = match decode(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    tracing::debug!(
        "Replica write {:?} ttl {} on {}",
        request.kind,
        request.item.ttl,
        coordinator.node().addr()
    );
    reply(coordinator.slave_write(request).await)
}

/// Served from the local tree: the caller already resolved this node as the
/// owner.
async fn handle_read(Extension(coordinator): Extension<Arc<Coordinator>>, body: Bytes) -> RpcResponse {
    let request: ReadRequest = match decode(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    reply(Ok(coordinator.read_local(&request)))
}

async fn handle_describe(Extension(coordinator): Extension<Arc<Coordinator>>) -> RpcResponse {
    reply(Ok(coordinator.describe()))
}

async fn handle_load(Extension(coordinator): Extension<Arc<Coordinator>>) -> RpcResponse {
    reply(Ok(coordinator.load()))
}

async fn handle_position_at(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    body: Bytes,
) -> RpcResponse {
    let index: usize = match decode(&body) {
        Ok(index) => index,
        Err(resp) => return resp,
    };
    reply(Ok(coordinator.position_at(index)))
}
