use axum::{Router, body::Bytes, extract::Extension, routing::post};
use std::sync::Arc;

use super::protocol::{ENDPOINT_GET_SUCCESSOR, ENDPOINT_NOTIFY, ENDPOINT_PING, ENDPOINT_RING};
use super::service::MembershipNode;
use crate::hash::Position;
use crate::ring::Remote;
use crate::transport::{RpcResponse, decode, reply};

pub fn router(node: Arc<MembershipNode>) -> Router {
    Router::new()
        .route(ENDPOINT_NOTIFY, post(handle_notify))
        .route(ENDPOINT_RING, post(handle_ring))
        .route(ENDPOINT_PING, post(handle_ping))
        .route(ENDPOINT_GET_SUCCESSOR, post(handle_get_successor))
        .layer(Extension(node))
}

async fn handle_notify(Extension(node): Extension<Arc<MembershipNode>>, body: Bytes) -> RpcResponse {
    let caller: Remote = match decode(&body) {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    reply(Ok(node.notify(caller)))
}

async fn handle_ring(Extension(node): Extension<Arc<MembershipNode>>) -> RpcResponse {
    reply(Ok(node.ring().nodes()))
}

async fn handle_ping() -> RpcResponse {
    reply(Ok(()))
}

async fn handle_get_successor(
    Extension(node): Extension<Arc<MembershipNode>>,
    body: Bytes,
) -> RpcResponse {
    let pos: Position = match decode(&body) {
        Ok(pos) => pos,
        Err(resp) => return resp,
    };
    reply(node.local_successor_for(&pos))
}
